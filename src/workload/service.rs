//! LoadBalancer Service in front of the Fufu's Deployment

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::{app_label, dependent_meta, service_name, Dependent, Reflection, APP_LABEL_KEY};
use crate::crd::{Fufu, FufuStatus};

/// Port exposed by the Service, forwarded to the same port on the pods
pub const SERVICE_PORT: i32 = 80;

impl Dependent for Service {
    fn dependent_name(fufu_name: &str) -> String {
        service_name(fufu_name)
    }

    fn build(fufu: &Fufu) -> Self {
        let fufu_name = fufu.name_any();

        Service {
            metadata: dependent_meta(fufu, service_name(&fufu_name)),
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                selector: Some(BTreeMap::from([(
                    APP_LABEL_KEY.to_string(),
                    app_label(&fufu_name),
                )])),
                ports: Some(vec![ServicePort {
                    port: SERVICE_PORT,
                    target_port: Some(IntOrString::Int(SERVICE_PORT)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Cluster IPs are immutable and node ports are allocated by the platform
    fn carry_over(update: &mut Self, observed: &Self) {
        let (Some(spec), Some(had)) = (update.spec.as_mut(), observed.spec.as_ref()) else {
            return;
        };

        if spec.cluster_ip.is_none() {
            spec.cluster_ip = had.cluster_ip.clone();
        }
        if spec.cluster_ips.is_none() {
            spec.cluster_ips = had.cluster_ips.clone();
        }
        if spec.health_check_node_port.is_none() {
            spec.health_check_node_port = had.health_check_node_port;
        }

        if let (Some(ports), Some(had_ports)) = (spec.ports.as_mut(), had.ports.as_ref()) {
            for (port, had_port) in ports.iter_mut().zip(had_ports) {
                if port.node_port.is_none() {
                    port.node_port = had_port.node_port;
                }
            }
        }
    }

    fn reflect_status(observed: &Self, status: &FufuStatus) -> Option<Reflection> {
        let ingress = observed
            .status
            .as_ref()?
            .load_balancer
            .as_ref()?
            .ingress
            .as_ref()?
            .first()?;

        let address = ingress
            .ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| ingress.hostname.as_deref().filter(|h| !h.is_empty()))?;

        (status.external_ip.as_deref() != Some(address))
            .then(|| Reflection::ExternalIp(address.to_string()))
    }
}
