//! Integration tests for CLI commands

use std::process::Command;

/// Helper to run shipyard command
fn shipyard(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_shipyard"))
        .args(args)
        .env_remove("SHIPYARD_CONFIG")
        .env_remove("SHIPYARD_MANIFESTS_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute shipyard")
}

/// Get the fixtures path
fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn fixture(name: &str) -> String {
    format!("{}/{}", fixtures_path(), name)
}

mod crd_command {
    use super::*;

    #[test]
    fn test_crd_is_valid_yaml() {
        let output = shipyard(&["crd"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let crd: serde_yaml::Value = serde_yaml::from_str(&stdout).expect("CRD should be YAML");
        assert_eq!(crd["kind"].as_str(), Some("CustomResourceDefinition"));
        assert_eq!(
            crd["metadata"]["name"].as_str(),
            Some("clusterinstallations.shipyard.dev")
        );
        assert_eq!(crd["spec"]["scope"].as_str(), Some("Namespaced"));
    }
}

mod resolve_version_command {
    use super::*;

    fn resolve(target: &str) -> std::process::Output {
        shipyard(&[
            "resolve-version",
            "--matrix",
            &fixture("matrix.json"),
            "--target",
            target,
        ])
    }

    #[test]
    fn test_resolves_newest_entry_not_above_target() {
        let output = resolve("v1.5.0");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "v1alpha2");

        let output = resolve("v1.2.3");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "v1alpha1");
    }

    #[test]
    fn test_develop_uses_latest_schema() {
        let output = resolve("develop");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "v1alpha2");
    }

    #[test]
    fn test_version_below_matrix_fails() {
        let output = resolve("v0.9.0");
        assert!(!output.status.success());
        assert_eq!(output.status.code(), Some(4));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("v0.9.0"));
    }

    #[test]
    fn test_missing_matrix_file() {
        let output = shipyard(&[
            "resolve-version",
            "--matrix",
            &fixture("no-such-matrix.json"),
            "--target",
            "v1.5.0",
        ]);
        assert_eq!(output.status.code(), Some(5));
    }
}

mod render_command {
    use super::*;

    fn render(args: &[&str]) -> std::process::Output {
        let manifests = fixture("manifests");
        let installation = fixture("installation.yaml");
        let mut full = vec![
            "render",
            "--manifests-dir",
            manifests.as_str(),
            "-f",
            installation.as_str(),
        ];
        full.extend_from_slice(args);
        shipyard(&full)
    }

    #[test]
    fn test_render_core() {
        let output = render(&["core"]);

        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.matches("---\n# ").count(), 10);
        assert!(stdout.contains("# Secret/shipyard-jwt"));
        assert!(stdout.contains("# Certificate/shipyard-api-tls"));
        assert!(stdout.contains("ghcr.io/shipyard/api:v1.5.0"));
        assert!(stdout.contains("ghcr.io/shipyard/legacy-dashboard:v0.9.0"));
        assert!(stdout.contains("shipyard.dev/installation: shipyard-system.main"));
        assert!(!stdout.contains("ownerReferences"));
    }

    #[test]
    fn test_render_show_only() {
        let output = render(&["core", "--show-only", "Deployment/shipyard-api"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let deployment: serde_yaml::Value =
            serde_yaml::from_str(&stdout).expect("output should be one YAML document");
        assert_eq!(deployment["metadata"]["namespace"].as_str(), Some("platform"));
        assert_eq!(deployment["spec"]["replicas"].as_u64(), Some(2));
        assert_eq!(
            deployment["spec"]["template"]["spec"]["containers"][2]["image"].as_str(),
            Some("docker.io/library/nginx:1.27")
        );
    }

    #[test]
    fn test_render_values_reach_templates() {
        let output = render(&["core", "-s", "ConfigMap/shipyard-api"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let config: serde_yaml::Value = serde_yaml::from_str(&stdout).unwrap();
        assert_eq!(config["data"]["logLevel"].as_str(), Some("debug"));
        assert_eq!(
            config["data"]["objectStoreEndpoint"].as_str(),
            Some("http://minio.platform.svc:9000")
        );
    }

    #[test]
    fn test_render_workspaces_has_no_secrets() {
        let output = render(&["workspaces"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("# Deployment/shipyard-workspaces"));
        assert!(stdout.contains("ghcr.io/shipyard/workspaces:v1.5.0"));
        assert!(!stdout.contains("Secret"));
    }

    #[test]
    fn test_render_chart_component_is_rejected() {
        let output = render(&["database"]);

        assert_eq!(output.status.code(), Some(64));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("core"));
    }

    #[test]
    fn test_render_unknown_resource() {
        let output = render(&["core", "-s", "Deployment/nope"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_render_missing_manifests_dir() {
        let output = shipyard(&[
            "render",
            "core",
            "--manifests-dir",
            &fixture("no-such-dir"),
            "-f",
            &fixture("installation.yaml"),
        ]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_render_invalid_installation() {
        let output = shipyard(&[
            "render",
            "core",
            "--manifests-dir",
            &fixture("manifests"),
            "-f",
            &fixture("matrix.json"),
        ]);
        assert_eq!(output.status.code(), Some(2));
    }
}

mod config {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_file_sets_manifests_dir() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "manifestsDir: {}", fixture("manifests")).unwrap();

        let output = shipyard(&[
            "render",
            "workspaces",
            "--config",
            file.path().to_str().unwrap(),
            "-f",
            &fixture("installation.yaml"),
        ]);
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    #[test]
    fn test_invalid_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "requeueInterval: [not, a, duration]").unwrap();

        let output = shipyard(&["crd", "--config", file.path().to_str().unwrap()]);
        assert_eq!(output.status.code(), Some(2));
    }
}
