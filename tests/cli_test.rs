//! CLI integration tests for the archy binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("archy"))
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

// Helper to create a temp file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

mod compile_command {
    use super::*;

    #[test]
    fn compile_single_intent() {
        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intent",
                "simple website",
                "--scope",
                "rg-demo",
                "--region",
                "westeurope",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"resource "azurerm_service_plan" "shared" {"#,
            ))
            .stdout(predicate::str::contains(
                "service_plan_id     = azurerm_service_plan.shared.id",
            ));
    }

    #[test]
    fn compile_with_context_file() {
        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intent",
                "file storage",
                "--context",
                &fixture("context.json"),
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"subscription_id = "00000000-0000-0000-0000-000000000000""#,
            ))
            .stdout(predicate::str::contains(r#"location                 = "westeurope""#));
    }

    #[test]
    fn flags_override_context_file() {
        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intent",
                "file storage",
                "--context",
                &fixture("context.json"),
                "--region",
                "northeurope",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"northeurope\""))
            .stdout(predicate::str::contains("westeurope").not());
    }

    #[test]
    fn compile_intents_file_with_overrides() {
        let dir = TempDir::new().unwrap();
        let intents = write_temp_file(
            &dir,
            "intents.json",
            r#"[
                { "name": "simple website", "description": "marketing site" },
                {
                    "name": "file storage",
                    "attributes": {
                        "azurerm_storage_account": { "account_tier": "Standard" }
                    }
                }
            ]"#,
        );

        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intents",
                intents.to_str().unwrap(),
                "--scope",
                "rg-demo",
                "--region",
                "westeurope",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""Standard""#))
            .stdout(predicate::str::contains(
                r#"resource "azurerm_linux_web_app" "simple_website" {"#,
            ));
    }

    #[test]
    fn compile_writes_output_and_report() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("main.tf");
        let report = dir.path().join("report.json");

        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intent",
                "message queue",
                "--scope",
                "rg-demo",
                "--region",
                "westeurope",
                "--output",
                output.to_str().unwrap(),
                "--report",
                report.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains(r#"resource "azurerm_servicebus_queue" "message_queue" {"#));

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(report["intents"][0]["dropped"][0], "azurerm_event_fabric");
        assert_eq!(report["intents"][0]["status"], "compiled");
    }

    #[test]
    fn partial_batch_warns_on_stderr() {
        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intent",
                "simple website",
                "--intent",
                "hallucination",
                "--scope",
                "rg-demo",
                "--region",
                "westeurope",
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains("intent 'hallucination' skipped"));
    }

    #[test]
    fn cycle_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "cycle.json",
            r#"{
                "provider_versions": { "acme/acme": "0.1.0" },
                "provider_schemas": { "acme/acme": { "resource_schemas": {
                    "acme_x": { "block": { "attributes": { "y_id": { "type": "string", "required": true } } } },
                    "acme_y": { "block": { "attributes": { "x_id": { "type": "string", "required": true } } } }
                } } }
            }"#,
        );
        let oracle = write_temp_file(&dir, "oracle.json", r#"{ "loop": ["acme_x"] }"#);

        cmd()
            .args([
                "compile",
                "--schema",
                schema.to_str().unwrap(),
                "--provider",
                "acme/acme",
                "--oracle",
                oracle.to_str().unwrap(),
                "--intent",
                "loop",
                "--scope",
                "rg",
                "--region",
                "eu",
            ])
            .assert()
            .failure()
            .code(2)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("circular dependency involving acme_x"));
    }

    #[test]
    fn missing_region_is_an_error() {
        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
                "--intent",
                "simple website",
                "--scope",
                "rg-demo",
            ])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("scope and region are required"));
    }
}

mod kinds_command {
    use super::*;

    #[test]
    fn lists_all_kinds_sorted() {
        cmd()
            .args(["kinds", "--schema", &fixture("azurerm_catalog.json")])
            .assert()
            .success()
            .stdout(predicate::str::starts_with(
                "azurerm_linux_web_app\nazurerm_mssql_database\n",
            ));
    }

    #[test]
    fn filter_by_substring() {
        cmd()
            .args([
                "kinds",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--filter",
                "servicebus",
            ])
            .assert()
            .success()
            .stdout("azurerm_servicebus_namespace\nazurerm_servicebus_queue\n");
    }
}

mod inspect_command {
    use super::*;

    #[test]
    fn shows_dependencies() {
        let output = cmd()
            .args([
                "inspect",
                "azurerm_linux_web_app",
                "--schema",
                &fixture("azurerm_catalog.json"),
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["provider_version"], "3.85.0");
        assert_eq!(json["dependencies"][0]["resource_type"], "azurerm_service_plan");
        assert_eq!(json["dependencies"][0]["attribute_name"], "service_plan_id");
        assert_eq!(json["dependency_tree"]["dependencies"][0]["tree"]["kind"], "azurerm_service_plan");
    }

    #[test]
    fn unknown_kind() {
        cmd()
            .args([
                "inspect",
                "azurerm_nothing",
                "--schema",
                &fixture("azurerm_catalog.json"),
            ])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("unknown resource kind"));
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn valid_attributes() {
        cmd()
            .args([
                "validate",
                "azurerm_service_plan",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--attributes",
                "name,location,resource_group_name,os_type,sku_name",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn invalid_attributes() {
        cmd()
            .args([
                "validate",
                "azurerm_service_plan",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--attributes",
                "name,id,colour",
            ])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("location: missing required attribute"))
            .stderr(predicate::str::contains("colour: not in schema"))
            .stderr(predicate::str::contains("id: computed by provider"));
    }

    #[test]
    fn json_output() {
        cmd()
            .args([
                "validate",
                "azurerm_service_plan",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--attributes",
                "id",
                "--json",
            ])
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains(r#""type":"computed_only""#));
    }
}

mod lint_command {
    use super::*;

    #[test]
    fn lint_fixture_catalog() {
        // sql_firewall_rule's server_id only resolves through the generic
        // token and matches two server kinds; mssql_database's resolves in
        // its own namespace.
        cmd()
            .args(["lint", "--schema", &fixture("azurerm_catalog.json")])
            .assert()
            .success()
            .stdout(predicate::str::contains("ambiguous-reference"))
            .stdout(predicate::str::contains("azurerm_sql_firewall_rule"))
            .stdout(predicate::str::contains("azurerm_mssql_database").not());
    }

    #[test]
    fn lint_strict_fails_on_warnings() {
        cmd()
            .args([
                "lint",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--strict",
            ])
            .assert()
            .failure()
            .code(1);
    }

    #[test]
    fn lint_json_output() {
        let output = cmd()
            .args([
                "lint",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["kinds_checked"], 10);
        assert_eq!(json["errors"], 0);
        assert_eq!(json["results"].as_array().unwrap().len(), 1);
        assert_eq!(json["results"][0]["kind"], "azurerm_sql_firewall_rule");
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn schema_file_not_found() {
        cmd()
            .args(["kinds", "--schema", "/nonexistent/catalog.json"])
            .assert()
            .failure()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn invalid_json_schema() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "bad.json", "{ not valid json }");

        cmd()
            .args(["kinds", "--schema", schema.to_str().unwrap()])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("invalid JSON"));
    }

    #[test]
    fn unknown_provider() {
        cmd()
            .args([
                "kinds",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--provider",
                "hashicorp/aws",
            ])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("provider 'hashicorp/aws' not in schema"));
    }

    #[test]
    fn missing_version_pin() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "unpinned.json",
            r#"{ "provider_schemas": { "acme/acme": { "resource_schemas": {} } } }"#,
        );

        cmd()
            .args([
                "kinds",
                "--schema",
                schema.to_str().unwrap(),
                "--provider",
                "acme/acme",
            ])
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("no version pin"));

        cmd()
            .args([
                "kinds",
                "--schema",
                schema.to_str().unwrap(),
                "--provider",
                "acme/acme",
                "--provider-version",
                "1.0.0",
            ])
            .assert()
            .success();
    }
}

mod help_and_version {
    use super::*;

    #[test]
    fn help_flag() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("compile"))
            .stdout(predicate::str::contains("lint"));
    }

    #[test]
    fn version_flag() {
        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("archy"));
    }

    #[test]
    fn compile_requires_intent() {
        cmd()
            .args([
                "compile",
                "--schema",
                &fixture("azurerm_catalog.json"),
                "--oracle",
                &fixture("oracle.json"),
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--intent"));
    }
}
