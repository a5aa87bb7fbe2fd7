//! In-memory cluster for exercising the reconciler end to end
//!
//! Behaves like a small API server: it assigns uids and resourceVersions,
//! rejects stale writes, refuses to change a Service's cluster IP and fills in
//! the defaults the real server adds (replicas, strategy, pull policies,
//! protocols, cluster IPs, node ports). The defaults matter: they are exactly
//! what the derivative diff has to see through.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{ApiResource, DynamicObject};
use kube::core::ErrorResponse;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde_json::{json, Map, Value};

use super::client::FufuKubeClient;
use super::converge::{from_dynamic, to_dynamic};
use crate::crd::{Fufu, FufuStatus};
use crate::events::EventPublisher;
use crate::workload::Dependent;
use crate::Error;

type ObjectKey = (String, String, String);

#[derive(Default)]
struct State {
    fufus: BTreeMap<(String, String), Fufu>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    version: u64,
    writes: usize,
    status_writes: usize,
    failing_creates: BTreeSet<String>,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Fake API server holding Fufus and their dependents
#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn key(kind: &str, namespace: &str, name: &str) -> ObjectKey {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a Fufu as if a user applied it, returning the stored copy
    pub fn apply_fufu(&self, mut fufu: Fufu) -> Fufu {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let name = fufu.name_any();
        fufu.metadata.uid.get_or_insert_with(|| format!("{name}-uid"));
        fufu.metadata.resource_version = Some(version.to_string());
        let namespace = fufu.namespace().unwrap_or_default();
        state.fufus.insert((namespace, name), fufu.clone());
        fufu
    }

    pub fn delete_fufu(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .fufus
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn fufu(&self, namespace: &str, name: &str) -> Option<Fufu> {
        let state = self.state.lock().unwrap();
        state
            .fufus
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Raw stored copy of a dependent
    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<DynamicObject> {
        let state = self.state.lock().unwrap();
        state.objects.get(&key(kind, namespace, name)).cloned()
    }

    /// Read a dependent back as its typed form
    pub fn get<K: Dependent>(&self, namespace: &str, name: &str) -> Option<K> {
        let kind = K::kind(&());
        let object = self.object(&kind, namespace, name)?;
        from_dynamic(object, &kind, name).ok()
    }

    /// Change a dependent behind the controller's back (users, HPA, kubelet...)
    pub fn edit<K: Dependent>(&self, namespace: &str, name: &str, change: impl FnOnce(&mut K)) {
        let mut object: K = self
            .get(namespace, name)
            .unwrap_or_else(|| panic!("{name} does not exist"));
        change(&mut object);

        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        object.meta_mut().resource_version = Some(version.to_string());
        let kind = K::kind(&()).to_string();
        let dynamic = to_dynamic(&object, &kind, name).unwrap();
        state.objects.insert(key(&kind, namespace, name), dynamic);
    }

    /// Store a dependent that the controller did not create
    pub fn insert<K: Dependent>(&self, object: K) {
        let kind = K::kind(&()).to_string();
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let mut dynamic = to_dynamic(&object, &kind, &name).unwrap();

        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        dynamic.metadata.uid = Some(format!("uid-{version}"));
        dynamic.metadata.resource_version = Some(version.to_string());
        state.objects.insert(key(&kind, &namespace, &name), dynamic);
    }

    /// Make every create of `kind` fail with 403 Forbidden
    pub fn fail_creates_of(&self, kind: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_creates
            .insert(kind.to_string());
    }

    /// Number of successful creates and replaces of dependents
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Number of successful Fufu status writes
    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }
}

fn set_default(map: &mut Map<String, Value>, field: &str, value: Value) {
    map.entry(field.to_string()).or_insert(value);
}

/// Fill in what the API server would default on write
fn apply_defaults(kind: &str, data: &mut Value, serial: u64) {
    let Some(spec) = data.get_mut("spec").and_then(Value::as_object_mut) else {
        return;
    };

    match kind {
        "Deployment" => {
            set_default(spec, "replicas", json!(1));
            set_default(spec, "revisionHistoryLimit", json!(10));
            set_default(spec, "progressDeadlineSeconds", json!(600));
            set_default(
                spec,
                "strategy",
                json!({
                    "type": "RollingUpdate",
                    "rollingUpdate": {"maxSurge": "25%", "maxUnavailable": "25%"}
                }),
            );

            let pod = spec
                .get_mut("template")
                .and_then(|t| t.get_mut("spec"))
                .and_then(Value::as_object_mut);
            if let Some(pod) = pod {
                set_default(pod, "restartPolicy", json!("Always"));
                set_default(pod, "dnsPolicy", json!("ClusterFirst"));
                set_default(pod, "schedulerName", json!("default-scheduler"));
                set_default(pod, "terminationGracePeriodSeconds", json!(30));
                set_default(pod, "securityContext", json!({}));

                for list in ["initContainers", "containers"] {
                    let containers = pod.get_mut(list).and_then(Value::as_array_mut);
                    for container in containers.into_iter().flatten() {
                        let Some(container) = container.as_object_mut() else {
                            continue;
                        };
                        set_default(container, "imagePullPolicy", json!("Always"));
                        set_default(
                            container,
                            "terminationMessagePath",
                            json!("/dev/termination-log"),
                        );
                        set_default(container, "terminationMessagePolicy", json!("File"));
                        let ports = container.get_mut("ports").and_then(Value::as_array_mut);
                        for port in ports.into_iter().flatten().filter_map(Value::as_object_mut) {
                            set_default(port, "protocol", json!("TCP"));
                        }
                    }
                }
            }
        }
        "Service" => {
            let ip = format!("10.96.0.{}", serial % 250 + 1);
            set_default(spec, "clusterIP", json!(ip));
            set_default(spec, "clusterIPs", json!([ip]));
            set_default(spec, "sessionAffinity", json!("None"));
            set_default(spec, "ipFamilies", json!(["IPv4"]));
            set_default(spec, "ipFamilyPolicy", json!("SingleStack"));
            set_default(spec, "internalTrafficPolicy", json!("Cluster"));

            let load_balancer = spec.get("type") == Some(&json!("LoadBalancer"));
            if load_balancer {
                set_default(spec, "externalTrafficPolicy", json!("Cluster"));
                set_default(spec, "allocateLoadBalancerNodePorts", json!(true));
            }

            let ports = spec.get_mut("ports").and_then(Value::as_array_mut);
            for (index, port) in ports
                .into_iter()
                .flatten()
                .filter_map(Value::as_object_mut)
                .enumerate()
            {
                set_default(port, "protocol", json!("TCP"));
                if load_balancer {
                    set_default(port, "nodePort", json!(30000 + serial % 2000 + index as u64));
                }
            }
        }
        _ => {}
    }
}

fn cluster_ip(object: &DynamicObject) -> Option<&Value> {
    object.data.get("spec").and_then(|s| s.get("clusterIP"))
}

#[async_trait]
impl FufuKubeClient for FakeCluster {
    async fn get_fufu(&self, name: &str, namespace: &str) -> Result<Option<Fufu>, Error> {
        Ok(self.fufu(namespace, name))
    }

    async fn patch_fufu_status(&self, fufu: &Fufu, status: &FufuStatus) -> Result<Fufu, Error> {
        let name = fufu.name_any();
        let namespace = fufu.namespace().unwrap_or_default();

        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let stored = state
            .fufus
            .get_mut(&(namespace, name.clone()))
            .ok_or_else(|| api_error(404, "NotFound", format!("fufus \"{name}\" not found")))?;

        if fufu.resource_version().is_some() && fufu.resource_version() != stored.resource_version()
        {
            return Err(Error::conflict("Fufu", name, "the object has been modified"));
        }

        let merged = stored.status.get_or_insert_with(FufuStatus::default);
        merged.replicas = status.replicas;
        if status.external_ip.is_some() {
            merged.external_ip = status.external_ip.clone();
        }
        stored.metadata.resource_version = Some(version.to_string());
        let updated = stored.clone();
        state.status_writes += 1;
        Ok(updated)
    }

    async fn get_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, Error> {
        Ok(self.object(&resource.kind, namespace, name))
    }

    async fn create_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = object.name_any();
        let mut state = self.state.lock().unwrap();

        if state.failing_creates.contains(&resource.kind) {
            return Err(api_error(
                403,
                "Forbidden",
                format!("cannot create {} \"{name}\"", resource.kind),
            ));
        }
        let key = key(&resource.kind, namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists(&resource.kind, name));
        }

        let version = state.next_version();
        let mut stored = object.clone();
        stored.metadata.uid = Some(format!("uid-{version}"));
        stored.metadata.resource_version = Some(version.to_string());
        stored.metadata.namespace = Some(namespace.to_string());
        if let Some(data) = stored.data.as_object_mut() {
            data.remove("status");
        }
        apply_defaults(&resource.kind, &mut stored.data, version);

        state.objects.insert(key, stored.clone());
        state.writes += 1;
        Ok(stored)
    }

    async fn replace_dependent(
        &self,
        resource: &ApiResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, Error> {
        let name = object.name_any();
        let mut state = self.state.lock().unwrap();
        let key = key(&resource.kind, namespace, &name);

        let current = state.objects.get(&key).cloned().ok_or_else(|| {
            api_error(404, "NotFound", format!("{} \"{name}\" not found", resource.kind))
        })?;
        if object.resource_version() != current.resource_version() {
            return Err(Error::conflict(
                &resource.kind,
                name,
                "the object has been modified",
            ));
        }
        if resource.kind == "Service" && cluster_ip(object) != cluster_ip(&current) {
            return Err(api_error(
                422,
                "Invalid",
                format!("Service \"{name}\": spec.clusterIP: field is immutable"),
            ));
        }

        let version = state.next_version();
        let mut stored = object.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.resource_version = Some(version.to_string());
        if let Some(data) = stored.data.as_object_mut() {
            match current.data.get("status") {
                Some(status) => data.insert("status".to_string(), status.clone()),
                None => data.remove("status"),
            };
        }
        apply_defaults(&resource.kind, &mut stored.data, version);

        state.objects.insert(key, stored.clone());
        state.writes += 1;
        Ok(stored)
    }
}

/// An event captured by [`RecordingEventPublisher`]
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RecordedEvent {
    pub reason: String,
    pub warning: bool,
    pub note: Option<String>,
}

/// Event publisher remembering everything it was asked to publish
#[derive(Default)]
pub(crate) struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            reason: reason.to_string(),
            warning: matches!(type_, EventType::Warning),
            note,
        });
    }
}
