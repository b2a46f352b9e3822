use serde_json::Value as JsonValue;
use shipyard_core::Resource;

use super::{Filter, FilterStage};

/// Split an image reference into (name, tag)
///
/// The tag is only looked for after the last `/` so registry ports are not
/// mistaken for tags. Digest references are returned with no tag.
///
/// ```
/// use shipyard_engine::transform::split_image;
///
/// assert_eq!(split_image("registry:5000/api:v1"), ("registry:5000/api", Some("v1")));
/// assert_eq!(split_image("api"), ("api", None));
/// ```
pub fn split_image(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    let slash = image.rfind('/').map_or(0, |i| i + 1);
    match image[slash..].rfind(':') {
        Some(colon) => {
            let at = slash + colon;
            (&image[..at], Some(&image[at + 1..]))
        }
        None => (image, None),
    }
}

/// Pins container images to the platform version
///
/// Only images under `repository_prefix` are rewritten; images listed in
/// `skip` (matched on the name without tag) and digest references are left
/// untouched.
#[derive(Debug, Clone)]
pub struct ImageVersionFilter {
    version: String,
    repository_prefix: String,
    skip: Vec<String>,
}

impl ImageVersionFilter {
    pub fn new(version: impl Into<String>, repository_prefix: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            repository_prefix: repository_prefix.into(),
            skip: Vec::new(),
        }
    }

    /// Leave these image names alone
    pub fn skipping(mut self, images: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skip.extend(images.into_iter().map(Into::into));
        self
    }

    fn pod_spec_pointer(kind: &str) -> Option<&'static str> {
        match kind {
            "Pod" => Some("/spec"),
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Job" => {
                Some("/spec/template/spec")
            }
            "CronJob" => Some("/spec/jobTemplate/spec/template/spec"),
            _ => None,
        }
    }

    fn rewrite_image(&self, image: &str) -> Option<String> {
        let (name, _) = split_image(image);
        if image.contains('@')
            || !name.starts_with(&self.repository_prefix)
            || self.skip.iter().any(|s| s == name)
        {
            return None;
        }
        let pinned = format!("{}:{}", name, self.version);
        (pinned != image).then_some(pinned)
    }
}

impl Filter for ImageVersionFilter {
    fn name(&self) -> &'static str {
        "image-version"
    }

    fn stage(&self) -> FilterStage {
        FilterStage::Image
    }

    fn apply(&self, mut resources: Vec<Resource>) -> Vec<Resource> {
        for resource in &mut resources {
            let Some(pointer) = Self::pod_spec_pointer(resource.kind()) else {
                continue;
            };
            let Some(pod_spec) = resource.body_mut().pointer_mut(pointer) else {
                continue;
            };
            for field in ["initContainers", "containers"] {
                let Some(containers) = pod_spec.get_mut(field).and_then(JsonValue::as_array_mut)
                else {
                    continue;
                };
                for container in containers {
                    let rewritten = container
                        .get("image")
                        .and_then(JsonValue::as_str)
                        .and_then(|image| self.rewrite_image(image));
                    if let Some(image) = rewritten {
                        container["image"] = JsonValue::String(image);
                    }
                }
            }
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::ManifestBundle;

    const MANIFESTS: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: api
spec:
  template:
    spec:
      initContainers:
        - name: migrate
          image: ghcr.io/shipyard/migrate:latest
      containers:
        - name: api
          image: ghcr.io/shipyard/api:v1.0.0
        - name: proxy
          image: docker.io/envoyproxy/envoy:v1.30
        - name: pinned
          image: ghcr.io/shipyard/agent@sha256:abcd
        - name: legacy
          image: ghcr.io/shipyard/legacy-ui:v0.9.0
---
apiVersion: batch/v1
kind: CronJob
metadata:
  name: gc
spec:
  jobTemplate:
    spec:
      template:
        spec:
          containers:
            - name: gc
              image: ghcr.io/shipyard/gc
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: untouched
data:
  image: ghcr.io/shipyard/api:v1.0.0
"#;

    fn run() -> ManifestBundle {
        let filter = ImageVersionFilter::new("v1.5.0", "ghcr.io/shipyard/")
            .skipping(["ghcr.io/shipyard/legacy-ui"]);
        let bundle = ManifestBundle::from_yaml(MANIFESTS).unwrap();
        ManifestBundle::new(filter.apply(bundle.into_resources()))
    }

    #[test]
    fn test_split_image() {
        assert_eq!(split_image("nginx:1.25"), ("nginx", Some("1.25")));
        assert_eq!(split_image("localhost:5000/app"), ("localhost:5000/app", None));
        assert_eq!(split_image("a/b@sha256:1"), ("a/b@sha256:1", None));
    }

    #[test]
    fn test_pins_workload_images() {
        let out = run();
        let spec = out
            .find("Deployment", "api")
            .unwrap()
            .body()
            .pointer("/spec/template/spec")
            .unwrap()
            .clone();
        assert_eq!(spec["initContainers"][0]["image"], "ghcr.io/shipyard/migrate:v1.5.0");
        assert_eq!(spec["containers"][0]["image"], "ghcr.io/shipyard/api:v1.5.0");
        assert_eq!(spec["containers"][1]["image"], "docker.io/envoyproxy/envoy:v1.30");
        assert_eq!(spec["containers"][2]["image"], "ghcr.io/shipyard/agent@sha256:abcd");
        assert_eq!(spec["containers"][3]["image"], "ghcr.io/shipyard/legacy-ui:v0.9.0");
    }

    #[test]
    fn test_pins_cronjob_and_untagged() {
        let out = run();
        let cron = out.find("CronJob", "gc").unwrap();
        assert_eq!(
            cron.body()
                .pointer("/spec/jobTemplate/spec/template/spec/containers/0/image")
                .unwrap(),
            "ghcr.io/shipyard/gc:v1.5.0"
        );
    }

    #[test]
    fn test_ignores_non_workloads() {
        let out = run();
        let cm = out.find("ConfigMap", "untouched").unwrap();
        assert_eq!(cm.body()["data"]["image"], "ghcr.io/shipyard/api:v1.0.0");
    }
}
