//! Deployment serving the Fufu's web page

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, PodSpec, PodTemplateSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use super::{app_label, dependent_meta, deployment_name, Dependent, Reflection, APP_LABEL_KEY};
use crate::crd::{Fufu, FufuStatus};

/// Page template rendered by the init container
pub const CONTENT_TEMPLATE_URL: &str =
    "https://raw.githubusercontent.com/ZhengjunHUO/kubebuilder/main/k8s/nginx/index.html.tmpl";

/// Variables substituted into the page template
const TEMPLATE_VARIABLES: &str = "$FUR_COLOR $BREED $AGE $WEIGHT";

/// Volume shared between the init container and nginx
pub const CONTENT_VOLUME: &str = "homedir";

/// Init container rendering the page
pub const INIT_CONTAINER: &str = "prepare-webcontent";

/// Container serving the page
pub const WEB_CONTAINER: &str = "web";

fn render_script() -> String {
    format!(
        "wget {CONTENT_TEMPLATE_URL} && apk add gettext && envsubst '{TEMPLATE_VARIABLES}' < index.html.tmpl > /mnt/index.html"
    )
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

impl Dependent for Deployment {
    fn dependent_name(fufu_name: &str) -> String {
        deployment_name(fufu_name)
    }

    fn build(fufu: &Fufu) -> Self {
        let fufu_name = fufu.name_any();
        let labels = BTreeMap::from([(APP_LABEL_KEY.to_string(), app_label(&fufu_name))]);

        let init = Container {
            name: INIT_CONTAINER.to_string(),
            image: Some("alpine".to_string()),
            command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
            args: Some(vec![render_script()]),
            env: Some(vec![
                env("FUR_COLOR", fufu.spec.color.clone()),
                env("BREED", fufu.spec.breed()),
                env("AGE", fufu.spec.age.to_string()),
                env("WEIGHT", fufu.spec.weight.clone()),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: CONTENT_VOLUME.to_string(),
                mount_path: "/mnt".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let web = Container {
            name: WEB_CONTAINER.to_string(),
            image: Some("nginx".to_string()),
            ports: Some(vec![ContainerPort {
                container_port: 80,
                ..Default::default()
            }]),
            volume_mounts: Some(vec![VolumeMount {
                name: CONTENT_VOLUME.to_string(),
                mount_path: "/usr/share/nginx/html/index.html".to_string(),
                sub_path: Some("index.html".to_string()),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        };

        Deployment {
            metadata: dependent_meta(fufu, deployment_name(&fufu_name)),
            spec: Some(DeploymentSpec {
                // left to the autoscaler
                replicas: None,
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        volumes: Some(vec![Volume {
                            name: CONTENT_VOLUME.to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        }]),
                        init_containers: Some(vec![init]),
                        containers: vec![web],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn carry_over(update: &mut Self, observed: &Self) {
        let observed_replicas = observed.spec.as_ref().and_then(|s| s.replicas);
        if let Some(spec) = update.spec.as_mut() {
            if spec.replicas.is_none() {
                spec.replicas = observed_replicas;
            }
        }
    }

    fn reflect_status(observed: &Self, status: &FufuStatus) -> Option<Reflection> {
        let replicas = observed
            .status
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(0);
        (replicas != status.replicas).then_some(Reflection::Replicas(replicas))
    }
}
