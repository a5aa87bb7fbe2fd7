//! HorizontalPodAutoscaler for the Fufu's Deployment

use k8s_openapi::api::autoscaling::v1::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use kube::ResourceExt;

use super::{autoscaler_name, dependent_meta, deployment_name, Dependent};
use crate::crd::Fufu;

/// Lower replica bound
pub const MIN_REPLICAS: i32 = 2;

/// Upper replica bound
pub const MAX_REPLICAS: i32 = 5;

/// Average CPU utilization the autoscaler aims for
pub const CPU_TARGET_PERCENT: i32 = 60;

impl Dependent for HorizontalPodAutoscaler {
    fn dependent_name(fufu_name: &str) -> String {
        autoscaler_name(fufu_name)
    }

    fn build(fufu: &Fufu) -> Self {
        let fufu_name = fufu.name_any();

        HorizontalPodAutoscaler {
            metadata: dependent_meta(fufu, autoscaler_name(&fufu_name)),
            spec: Some(HorizontalPodAutoscalerSpec {
                min_replicas: Some(MIN_REPLICAS),
                max_replicas: MAX_REPLICAS,
                target_cpu_utilization_percentage: Some(CPU_TARGET_PERCENT),
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: "Deployment".to_string(),
                    name: deployment_name(&fufu_name),
                },
            }),
            ..Default::default()
        }
    }
}
