//! Pure construction of the child objects a replset needs.
//!
//! Every function here is deterministic: the same topology, replset and
//! platform always serialize to the same bytes.

use pkg_constants::api::{APPS_API_VERSION, CORE_API_VERSION};
use pkg_constants::labels::{APP_LABEL, APP_NAME, CR_LABEL, REPLSET_LABEL};
use pkg_constants::mongod::{
    DEFAULT_RUN_UID, DEFAULT_STORAGE_SIZE, KEY_FILE_MODE, KEY_SECRET_DATA_KEY,
    KEY_SECRET_MOUNT_DIR, KEY_SECRET_VOLUME, MONGOD_CONTAINER_NAME, MONGOD_DATA_DIR,
    MONGOD_DATA_VOLUME, MONGOD_PORT_NAME, USERS_SECRET_KEYS,
};
use pkg_types::meta::{LabelSelector, Labels, ObjectMeta, OwnerReference};
use pkg_types::platform::Platform;
use pkg_types::psmdb::{PerconaServerMongoDB, ReplsetSpec, ResourceSpecRequirements};
use pkg_types::quantity::Quantity;
use pkg_types::resources::{ResourceList, ResourceName, ResourceRequirements};
use pkg_types::secret::Secret;
use pkg_types::service::{Service, ServicePort, ServiceSpec};
use pkg_types::statefulset::{
    Container, ContainerPort, EnvVar, EnvVarSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodSecurityContext, PodSpec, PodTemplateSpec, SecretKeySelector,
    SecretVolumeSource, StatefulSet, StatefulSetSpec, Volume, VolumeMount,
};
use pkg_types::validate::{validate_name, validate_size};

use crate::error::{Error, Result};

/// The child objects owned by one replset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplsetResources {
    pub key_secret: Secret,
    pub service: Service,
    pub stateful_set: StatefulSet,
}

// --- Identity ---

/// Labels stamped on every object of a replset; also its pod selector.
pub fn labels_for(topology: &PerconaServerMongoDB, replset: &ReplsetSpec) -> Labels {
    let mut labels = topology_labels(topology);
    labels.insert(REPLSET_LABEL.to_string(), replset.name.clone());
    labels
}

/// Selector matching the member pods of a replset.
pub fn label_selector(topology: &PerconaServerMongoDB, replset: &ReplsetSpec) -> Labels {
    labels_for(topology, replset)
}

/// Labels shared by every replset of the topology.
fn topology_labels(topology: &PerconaServerMongoDB) -> Labels {
    let mut labels = Labels::new();
    labels.insert(APP_LABEL.to_string(), APP_NAME.to_string());
    labels.insert(CR_LABEL.to_string(), topology.metadata.name.clone());
    labels
}

/// Controller owner reference pointing at the topology.
pub fn as_owner(topology: &PerconaServerMongoDB) -> OwnerReference {
    OwnerReference {
        api_version: topology.api_version.clone(),
        kind: topology.kind.clone(),
        name: topology.metadata.name.clone(),
        uid: topology.metadata.uid.clone(),
        controller: Some(true),
        ..Default::default()
    }
}

/// `<topology>-<replset>`: the name of both the Service and the StatefulSet.
pub fn replset_object_name(topology: &PerconaServerMongoDB, replset: &ReplsetSpec) -> String {
    format!("{}-{}", topology.metadata.name, replset.name)
}

fn child_meta(topology: &PerconaServerMongoDB, name: &str, labels: Labels) -> ObjectMeta {
    ObjectMeta {
        labels,
        owner_references: vec![as_owner(topology)],
        ..ObjectMeta::named(&topology.metadata.namespace, name)
    }
}

// --- Resources ---

/// Parse one bound of a replset's resources. Empty strings leave the
/// dimension out. CPU given as a plain core count is normalized to one
/// decimal place (`1` becomes `1.0`); millicore values pass through.
pub fn parse_resource_list(replset: &str, reqs: &ResourceSpecRequirements) -> Result<ResourceList> {
    let invalid = |resource: ResourceName, value: &str, message: String| Error::ResourceSpecInvalid {
        replset: replset.to_string(),
        resource,
        value: value.to_string(),
        message,
    };

    let mut list = ResourceList::new();

    if !reqs.cpu.is_empty() {
        let cpu = if reqs.cpu.ends_with('m') {
            reqs.cpu.clone()
        } else {
            let cores: f64 = reqs
                .cpu
                .parse()
                .map_err(|e: std::num::ParseFloatError| {
                    invalid(ResourceName::Cpu, reqs.cpu.as_str(), e.to_string())
                })?;
            format!("{:.1}", cores)
        };
        let quantity = Quantity::parse(&cpu)
            .map_err(|e| invalid(ResourceName::Cpu, reqs.cpu.as_str(), e.to_string()))?;
        list.insert(ResourceName::Cpu, quantity);
    }

    for (name, value) in [
        (ResourceName::Memory, reqs.memory.as_str()),
        (ResourceName::Storage, reqs.storage.as_str()),
    ] {
        if value.is_empty() {
            continue;
        }
        let quantity = Quantity::parse(value).map_err(|e| invalid(name, value, e.to_string()))?;
        list.insert(name, quantity);
    }

    Ok(list)
}

/// Limits are taken as given. A request is kept only for dimensions that
/// also have a limit, so no pod ends up with an unbounded request, and it
/// must not exceed that limit.
pub fn parse_replset_resource_requirements(replset: &ReplsetSpec) -> Result<ResourceRequirements> {
    let limits = parse_resource_list(&replset.name, &replset.limits)?;
    let parsed_requests = parse_resource_list(&replset.name, &replset.requests)?;

    let mut requests = ResourceList::new();
    for (name, request) in parsed_requests {
        let Some(limit) = limits.get(&name) else {
            continue;
        };
        if request.value() > limit.value() {
            return Err(Error::ResourceSpecInvalid {
                replset: replset.name.clone(),
                resource: name,
                value: request.to_string(),
                message: format!("request exceeds limit {}", limit),
            });
        }
        requests.insert(name, request);
    }

    Ok(ResourceRequirements { limits, requests })
}

// --- Objects ---

/// Key-file Secret shared by all replsets of the topology. Carries no key
/// material: that is generated only when the Secret is first created.
pub fn build_key_secret(topology: &PerconaServerMongoDB) -> Secret {
    Secret {
        api_version: CORE_API_VERSION.to_string(),
        kind: "Secret".to_string(),
        metadata: child_meta(
            topology,
            &topology.key_secret_name(),
            topology_labels(topology),
        ),
        type_: "Opaque".to_string(),
        ..Default::default()
    }
}

/// Headless Service giving each member a stable DNS name.
pub fn build_service(topology: &PerconaServerMongoDB, replset: &ReplsetSpec) -> Service {
    let labels = labels_for(topology, replset);
    let port = topology.spec.mongod_port();
    Service {
        api_version: CORE_API_VERSION.to_string(),
        kind: "Service".to_string(),
        metadata: child_meta(topology, &replset_object_name(topology, replset), labels.clone()),
        spec: ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: labels,
            ports: vec![ServicePort {
                name: MONGOD_PORT_NAME.to_string(),
                port,
                target_port: port,
            }],
            ..Default::default()
        },
        ..Default::default()
    }
}

fn mongod_args(topology: &PerconaServerMongoDB, replset: &ReplsetSpec) -> Vec<String> {
    vec![
        "--bind_ip_all".to_string(),
        "--auth".to_string(),
        format!("--dbpath={}", MONGOD_DATA_DIR),
        format!("--port={}", topology.spec.mongod_port()),
        format!("--replSet={}", replset.name),
        format!("--keyFile={}/{}", KEY_SECRET_MOUNT_DIR, KEY_SECRET_DATA_KEY),
    ]
}

fn mongod_env(topology: &PerconaServerMongoDB) -> Vec<EnvVar> {
    let users = topology.spec.users_secret_name();
    USERS_SECRET_KEYS
        .iter()
        .map(|key| EnvVar {
            name: key.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: users.to_string(),
                    key: key.to_string(),
                }),
                ..Default::default()
            }),
        })
        .collect()
}

fn mongod_container(
    topology: &PerconaServerMongoDB,
    replset: &ReplsetSpec,
    resources: &ResourceRequirements,
) -> Container {
    Container {
        name: MONGOD_CONTAINER_NAME.to_string(),
        image: topology.spec.image(),
        args: mongod_args(topology, replset),
        ports: vec![ContainerPort {
            name: MONGOD_PORT_NAME.to_string(),
            container_port: topology.spec.mongod_port(),
            ..Default::default()
        }],
        env: mongod_env(topology),
        resources: resources.retain(&[ResourceName::Cpu, ResourceName::Memory]),
        volume_mounts: vec![
            VolumeMount {
                name: MONGOD_DATA_VOLUME.to_string(),
                mount_path: MONGOD_DATA_DIR.to_string(),
                read_only: false,
                ..Default::default()
            },
            VolumeMount {
                name: KEY_SECRET_VOLUME.to_string(),
                mount_path: KEY_SECRET_MOUNT_DIR.to_string(),
                read_only: true,
                ..Default::default()
            },
        ],
        working_dir: Some(MONGOD_DATA_DIR.to_string()),
        ..Default::default()
    }
}

/// OpenShift assigns pod UIDs itself; elsewhere mongod runs as `spec.runUid`.
fn security_context(topology: &PerconaServerMongoDB, platform: Platform) -> Option<PodSecurityContext> {
    match platform {
        Platform::Openshift => None,
        Platform::Kubernetes => {
            let uid = topology.spec.run_uid.unwrap_or(DEFAULT_RUN_UID);
            Some(PodSecurityContext {
                run_as_user: Some(uid),
                fs_group: Some(uid),
                run_as_non_root: Some(true),
                ..Default::default()
            })
        }
    }
}

fn data_volume_claim(resources: &ResourceRequirements) -> Result<PersistentVolumeClaim> {
    let storage = match resources
        .requests
        .get(&ResourceName::Storage)
        .or_else(|| resources.limits.get(&ResourceName::Storage))
    {
        Some(q) => q.clone(),
        None => Quantity::parse(DEFAULT_STORAGE_SIZE).map_err(|e| Error::ResourceSpecInvalid {
            replset: String::new(),
            resource: ResourceName::Storage,
            value: DEFAULT_STORAGE_SIZE.to_string(),
            message: e.to_string(),
        })?,
    };
    let mut requests = ResourceList::new();
    requests.insert(ResourceName::Storage, storage);

    Ok(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: MONGOD_DATA_VOLUME.to_string(),
            ..Default::default()
        },
        spec: PersistentVolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            resources: ResourceRequirements {
                limits: ResourceList::new(),
                requests,
            },
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn build_stateful_set(
    topology: &PerconaServerMongoDB,
    replset: &ReplsetSpec,
    resources: &ResourceRequirements,
    platform: Platform,
) -> Result<StatefulSet> {
    let labels = labels_for(topology, replset);
    let name = replset_object_name(topology, replset);

    Ok(StatefulSet {
        api_version: APPS_API_VERSION.to_string(),
        kind: "StatefulSet".to_string(),
        metadata: child_meta(topology, &name, labels.clone()),
        spec: StatefulSetSpec {
            replicas: replset.size,
            selector: LabelSelector {
                match_labels: labels.clone(),
            },
            service_name: name,
            template: PodTemplateSpec {
                metadata: ObjectMeta {
                    labels,
                    ..Default::default()
                },
                spec: PodSpec {
                    containers: vec![mongod_container(topology, replset, resources)],
                    volumes: vec![Volume {
                        name: KEY_SECRET_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: topology.key_secret_name(),
                            default_mode: Some(KEY_FILE_MODE),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    security_context: security_context(topology, platform),
                    ..Default::default()
                },
                ..Default::default()
            },
            volume_claim_templates: vec![data_volume_claim(resources)?],
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Build every child object of one replset.
pub fn build_replset_resources(
    topology: &PerconaServerMongoDB,
    replset: &ReplsetSpec,
    platform: Platform,
) -> Result<ReplsetResources> {
    validate_name(&replset.name)
        .and_then(|_| validate_size(replset.size))
        .map_err(|e| Error::InvalidReplset {
            replset: replset.name.clone(),
            message: e.to_string(),
        })?;

    let resources = parse_replset_resource_requirements(replset)?;
    Ok(ReplsetResources {
        key_secret: build_key_secret(topology),
        service: build_service(topology, replset),
        stateful_set: build_stateful_set(topology, replset, &resources, platform)?,
    })
}

// --- Updates ---

/// The observed StatefulSet patched towards `desired`, or `None` when the
/// replica count, mongod image, args and resources already match.
pub fn stateful_set_update(observed: &StatefulSet, desired: &StatefulSet) -> Option<StatefulSet> {
    let mut updated = observed.clone();
    let mut changed = false;

    if updated.spec.replicas != desired.spec.replicas {
        updated.spec.replicas = desired.spec.replicas;
        changed = true;
    }

    let Some(want) = desired.container(MONGOD_CONTAINER_NAME) else {
        return changed.then_some(updated);
    };
    match updated.container_mut(MONGOD_CONTAINER_NAME) {
        Some(have) => {
            if have.image != want.image {
                have.image = want.image.clone();
                changed = true;
            }
            if have.args != want.args {
                have.args = want.args.clone();
                changed = true;
            }
            if have.resources != want.resources {
                have.resources = want.resources.clone();
                changed = true;
            }
        }
        None => {
            updated.spec.template.spec.containers.push(want.clone());
            changed = true;
        }
    }

    changed.then_some(updated)
}

/// The observed key Secret with the topology added to its owners, or `None`
/// if it is already one. A Secret named explicitly by several topologies is
/// kept until the last of them is gone; an existing controller stays the
/// controller and later owners are added as plain owners.
pub fn key_secret_update(observed: &Secret, desired: &Secret) -> Option<Secret> {
    let mut updated = observed.clone();
    let mut changed = false;
    for owner in &desired.metadata.owner_references {
        let owners = &updated.metadata.owner_references;
        if owners.iter().any(|o| o.uid == owner.uid) {
            continue;
        }
        let mut owner = owner.clone();
        if owners.iter().any(OwnerReference::is_controller) {
            owner.controller = None;
        }
        updated.metadata.owner_references.push(owner);
        changed = true;
    }
    changed.then_some(updated)
}

/// The observed Service with the desired selector and ports, or `None` if
/// they already match. The assigned cluster IP is kept.
pub fn service_update(observed: &Service, desired: &Service) -> Option<Service> {
    if observed.spec.selector == desired.spec.selector && observed.spec.ports == desired.spec.ports
    {
        return None;
    }
    let mut updated = observed.clone();
    updated.spec.selector = desired.spec.selector.clone();
    updated.spec.ports = desired.spec.ports.clone();
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::psmdb::PerconaServerMongoDBSpec;

    fn reqs(cpu: &str, memory: &str, storage: &str) -> ResourceSpecRequirements {
        ResourceSpecRequirements {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
            storage: storage.to_string(),
        }
    }

    fn replset(limits: ResourceSpecRequirements, requests: ResourceSpecRequirements) -> ReplsetSpec {
        ReplsetSpec {
            name: "rs0".to_string(),
            size: 3,
            limits,
            requests,
        }
    }

    fn topology(replsets: Vec<ReplsetSpec>) -> PerconaServerMongoDB {
        let mut t = PerconaServerMongoDB::new(
            "test",
            "my-cluster",
            PerconaServerMongoDBSpec {
                replsets,
                ..Default::default()
            },
        );
        t.metadata.uid = "uid-1".to_string();
        t
    }

    #[test]
    fn labels_and_owner() {
        let rs = replset(Default::default(), Default::default());
        let t = topology(vec![rs.clone()]);
        let labels = labels_for(&t, &rs);
        assert_eq!(labels.get("app").map(String::as_str), Some("percona-server-mongodb"));
        assert_eq!(
            labels.get("percona-server-mongodb_cr").map(String::as_str),
            Some("my-cluster")
        );
        assert_eq!(labels.get("replset").map(String::as_str), Some("rs0"));

        let owner = as_owner(&t);
        assert_eq!(owner.kind, "PerconaServerMongoDB");
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn cpu_core_count_is_normalized() {
        let list = parse_resource_list("rs0", &reqs("1", "", "")).unwrap();
        assert_eq!(list[&ResourceName::Cpu].as_str(), "1.0");

        let list = parse_resource_list("rs0", &reqs("500m", "1G", "")).unwrap();
        assert_eq!(list[&ResourceName::Cpu].as_str(), "500m");
        assert_eq!(list[&ResourceName::Memory].as_str(), "1G");
        assert!(!list.contains_key(&ResourceName::Storage));
    }

    #[test]
    fn malformed_quantities_are_rejected() {
        let err = parse_resource_list("rs0", &reqs("abc", "", "")).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceSpecInvalid { resource: ResourceName::Cpu, ref value, .. } if value == "abc"
        ));

        let err = parse_resource_list("rs0", &reqs("", "1Gb", "")).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceSpecInvalid { resource: ResourceName::Memory, .. }
        ));
    }

    #[test]
    fn memory_limit_alone_admits_only_a_memory_request() {
        let rs = replset(reqs("", "1G", ""), reqs("500m", "512M", ""));
        let rr = parse_replset_resource_requirements(&rs).unwrap();
        assert_eq!(rr.limits.len(), 1);
        assert_eq!(rr.limits[&ResourceName::Memory].as_str(), "1G");
        assert_eq!(rr.requests.len(), 1);
        assert_eq!(rr.requests[&ResourceName::Memory].as_str(), "512M");
        assert!(!rr.requests.contains_key(&ResourceName::Cpu));
    }

    #[test]
    fn requests_require_a_limit() {
        let rs = replset(reqs("1", "", ""), reqs("500m", "1G", ""));
        let rr = parse_replset_resource_requirements(&rs).unwrap();
        assert_eq!(rr.requests[&ResourceName::Cpu].as_str(), "500m");
        assert!(!rr.requests.contains_key(&ResourceName::Memory));
        assert!(!rr.limits.contains_key(&ResourceName::Memory));
    }

    #[test]
    fn request_above_limit_is_rejected() {
        let rs = replset(reqs("1", "1G", ""), reqs("2", "", ""));
        let err = parse_replset_resource_requirements(&rs).unwrap_err();
        assert!(matches!(
            err,
            Error::ResourceSpecInvalid { resource: ResourceName::Cpu, .. }
        ));
    }

    #[test]
    fn stateful_set_shape() {
        let rs = replset(reqs("1", "1G", "5Gi"), reqs("1", "1G", "2Gi"));
        let t = topology(vec![rs.clone()]);
        let res = build_replset_resources(&t, &rs, Platform::Kubernetes).unwrap();

        let set = &res.stateful_set;
        assert_eq!(set.metadata.name, "my-cluster-rs0");
        assert_eq!(set.spec.replicas, 3);
        assert_eq!(set.spec.service_name, "my-cluster-rs0");
        assert_eq!(set.metadata.owner_references, vec![as_owner(&t)]);

        let mongod = set.container("mongod").unwrap();
        assert_eq!(mongod.image, "percona/percona-server-mongodb:3.6");
        assert!(mongod.args.contains(&"--replSet=rs0".to_string()));
        assert!(mongod.args.contains(&"--port=27017".to_string()));
        assert!(!mongod.resources.limits.contains_key(&ResourceName::Storage));
        assert_eq!(mongod.env.len(), USERS_SECRET_KEYS.len());

        let claim = &set.spec.volume_claim_templates[0];
        assert_eq!(claim.metadata.name, "mongod-data");
        assert_eq!(claim.spec.resources.requests[&ResourceName::Storage].as_str(), "2Gi");

        let ctx = set.spec.template.spec.security_context.as_ref().unwrap();
        assert_eq!(ctx.run_as_user, Some(1001));

        assert_eq!(res.service.spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(res.service.spec.ports[0].port, 27017);
        assert_eq!(res.key_secret.metadata.name, "my-cluster-mongodb-key");
        assert!(res.key_secret.string_data.is_empty());
        assert!(!res.key_secret.metadata.labels.contains_key("replset"));
    }

    #[test]
    fn storage_falls_back_to_default() {
        let rs = replset(Default::default(), Default::default());
        let t = topology(vec![rs.clone()]);
        let res = build_replset_resources(&t, &rs, Platform::Kubernetes).unwrap();
        let claim = &res.stateful_set.spec.volume_claim_templates[0];
        assert_eq!(claim.spec.resources.requests[&ResourceName::Storage].as_str(), "3Gi");
    }

    #[test]
    fn openshift_has_no_security_context() {
        let rs = replset(Default::default(), Default::default());
        let t = topology(vec![rs.clone()]);
        let res = build_replset_resources(&t, &rs, Platform::Openshift).unwrap();
        assert!(res.stateful_set.spec.template.spec.security_context.is_none());
    }

    #[test]
    fn build_is_deterministic() {
        let rs = replset(reqs("1", "1G", "1G"), reqs("1", "1G", ""));
        let t = topology(vec![rs.clone()]);
        let a = build_replset_resources(&t, &rs, Platform::Kubernetes).unwrap();
        let b = build_replset_resources(&t, &rs, Platform::Kubernetes).unwrap();
        assert_eq!(
            serde_json::to_vec(&a.stateful_set).unwrap(),
            serde_json::to_vec(&b.stateful_set).unwrap()
        );
        assert_eq!(
            serde_json::to_vec(&a.service).unwrap(),
            serde_json::to_vec(&b.service).unwrap()
        );
    }

    #[test]
    fn invalid_replset_name_is_rejected() {
        let mut rs = replset(Default::default(), Default::default());
        rs.name = "RS_0".to_string();
        let t = topology(vec![rs.clone()]);
        let err = build_replset_resources(&t, &rs, Platform::Kubernetes).unwrap_err();
        assert!(matches!(err, Error::InvalidReplset { .. }));
    }

    #[test]
    fn update_only_on_difference() {
        let rs = replset(reqs("1", "1G", ""), Default::default());
        let t = topology(vec![rs.clone()]);
        let desired = build_replset_resources(&t, &rs, Platform::Kubernetes)
            .unwrap()
            .stateful_set;
        assert!(stateful_set_update(&desired, &desired).is_none());

        // Server-canonicalized quantities compare equal.
        let mut observed = desired.clone();
        observed
            .container_mut("mongod")
            .unwrap()
            .resources
            .limits
            .insert(ResourceName::Cpu, Quantity::parse("1").unwrap());
        assert!(stateful_set_update(&observed, &desired).is_none());

        let mut bigger = rs.clone();
        bigger.size = 5;
        let desired = build_replset_resources(&t, &bigger, Platform::Kubernetes)
            .unwrap()
            .stateful_set;
        let updated = stateful_set_update(&observed, &desired).unwrap();
        assert_eq!(updated.spec.replicas, 5);
    }

    #[test]
    fn bare_observed_container_is_updated() {
        let rs = replset(Default::default(), Default::default());
        let t = topology(vec![rs.clone()]);
        let desired = build_replset_resources(&t, &rs, Platform::Kubernetes)
            .unwrap()
            .stateful_set;
        let mut observed = desired.clone();
        observed.spec.template.spec.containers = vec![Container {
            name: "mongod".to_string(),
            ..Default::default()
        }];
        let updated = stateful_set_update(&observed, &desired).unwrap();
        assert_eq!(
            updated.container("mongod").unwrap().image,
            "percona/percona-server-mongodb:3.6"
        );
    }

    #[test]
    fn key_secret_gains_plain_owner_when_shared() {
        let rs = replset(Default::default(), Default::default());
        let mut first = topology(vec![rs.clone()]);
        first.spec.secrets.key = "shared-key".to_string();
        let mut second = first.clone();
        second.metadata.name = "other".to_string();
        second.metadata.uid = "uid-2".to_string();

        let observed = build_key_secret(&first);
        assert!(key_secret_update(&observed, &observed).is_none());

        let updated = key_secret_update(&observed, &build_key_secret(&second)).unwrap();
        let owners = &updated.metadata.owner_references;
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].uid, "uid-1");
        assert!(owners[0].is_controller());
        assert_eq!(owners[1].uid, "uid-2");
        assert!(!owners[1].is_controller());
        assert!(key_secret_update(&updated, &build_key_secret(&second)).is_none());
    }

    #[test]
    fn key_secret_is_named_per_topology() {
        let rs = replset(Default::default(), Default::default());
        let a = topology(vec![rs.clone()]);
        let mut b = a.clone();
        b.metadata.name = "other".to_string();
        assert_ne!(build_key_secret(&a).metadata.name, build_key_secret(&b).metadata.name);
        let set = build_replset_resources(&b, &rs, Platform::Kubernetes)
            .unwrap()
            .stateful_set;
        let volume = set.spec.template.spec.volumes[0].secret.as_ref().unwrap();
        assert_eq!(volume.secret_name, "other-mongodb-key");
    }

    #[test]
    fn service_update_keeps_cluster_ip() {
        let rs = replset(Default::default(), Default::default());
        let t = topology(vec![rs.clone()]);
        let desired = build_service(&t, &rs);
        assert!(service_update(&desired, &desired).is_none());

        let mut observed = desired.clone();
        observed.spec.ports[0].port = 1;
        let updated = service_update(&observed, &desired).unwrap();
        assert_eq!(updated.spec.ports[0].port, 27017);
        assert_eq!(updated.spec.cluster_ip.as_deref(), Some("None"));
    }
}
