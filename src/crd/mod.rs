//! Custom Resource Definitions for the Fufu operator

mod fufu;

pub use fufu::{AdditionalInfo, Fufu, FufuSpec, FufuStatus, FUFU_GROUP, FUFU_VERSION};
