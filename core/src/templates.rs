//! Reusable container-creation templates.
//!
//! Built-in templates are process constants. User templates live in a
//! [`TemplateStore`] that writes itself to disk after every mutation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{load_json, save_json};
use crate::types::CreateContainerSpec;
use crate::validation::CPU_QUOTA_PER_CORE;

// ============================================================================
// Template Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePort {
    /// "5432/tcp"; protocol defaults to tcp when omitted.
    pub container_port: String,
    pub host_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVolume {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEnvVar {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Serialized form uses camelCase keys so exported files stay compatible
/// with templates shared by the desktop client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<TemplatePort>,
    #[serde(default)]
    pub volumes: Vec<TemplateVolume>,
    #[serde(default)]
    pub env_vars: Vec<TemplateEnvVar>,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,
    #[serde(default)]
    pub command: String,
    /// MiB.
    #[serde(default)]
    pub memory_limit: String,
    /// Cores.
    #[serde(default)]
    pub cpu_limit: String,
    #[serde(default)]
    pub is_custom: bool,
}

fn default_network() -> String {
    "bridge".to_string()
}

fn default_restart_policy() -> String {
    "no".to_string()
}

impl Template {
    /// Pre-populated creation spec, the way the create form fills itself in.
    pub fn to_create_spec(&self) -> CreateContainerSpec {
        let ports = self
            .ports
            .iter()
            .filter(|p| !p.container_port.is_empty() && !p.host_port.is_empty())
            .map(|p| {
                let key = if p.container_port.contains('/') {
                    p.container_port.clone()
                } else {
                    format!("{}/tcp", p.container_port)
                };
                (key, p.host_port.clone())
            })
            .collect();

        let volumes = self
            .volumes
            .iter()
            .filter(|v| !v.source.is_empty() && !v.target.is_empty())
            .map(|v| {
                let suffix = if v.readonly { ":ro" } else { "" };
                format!("{}:{}{}", v.source, v.target, suffix)
            })
            .collect();

        let env = self
            .env_vars
            .iter()
            .filter(|e| !e.key.is_empty())
            .map(|e| format!("{}={}", e.key, e.value))
            .collect();

        let command: Vec<String> = self.command.split_whitespace().map(String::from).collect();

        let memory_limit = self
            .memory_limit
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|mb| *mb > 0.0)
            .map(|mb| (mb * 1024.0 * 1024.0).round() as i64);
        let cpu_quota = self
            .cpu_limit
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|cpus| *cpus > 0.0)
            .map(|cpus| (cpus * CPU_QUOTA_PER_CORE as f64).round() as i64);

        CreateContainerSpec {
            image: self.image.clone(),
            name: None,
            ports,
            volumes,
            env,
            network: Some(self.network.clone()).filter(|n| !n.is_empty() && n != "bridge"),
            restart_policy: Some(self.restart_policy.clone())
                .filter(|p| !p.is_empty() && p != "no"),
            command: (!command.is_empty()).then_some(command),
            memory_limit,
            cpu_quota,
        }
    }
}

// ============================================================================
// Built-in Catalogue
// ============================================================================

pub struct Category {
    pub id: &'static str,
    pub name: &'static str,
    /// `None` for the "all" and "custom" pseudo-categories.
    pub members: Option<&'static [&'static str]>,
}

pub const CATEGORIES: &[Category] = &[
    Category { id: "all", name: "All Templates", members: None },
    Category { id: "custom", name: "My Templates", members: None },
    Category {
        id: "database",
        name: "Databases",
        members: Some(&["postgres", "mysql", "mongodb", "mariadb"]),
    },
    Category { id: "cache", name: "Caching", members: Some(&["redis", "memcached"]) },
    Category {
        id: "web",
        name: "Web Servers",
        members: Some(&["nginx", "apache", "traefik", "caddy", "haproxy"]),
    },
    Category {
        id: "runtime",
        name: "Runtimes",
        members: Some(&["node", "python", "golang", "rust", "php", "ruby"]),
    },
    Category { id: "messaging", name: "Messaging", members: Some(&["rabbitmq"]) },
    Category { id: "monitoring", name: "Monitoring", members: Some(&["elasticsearch"]) },
    Category { id: "devtools", name: "Dev Tools", members: Some(&["registry", "adminer"]) },
    Category { id: "cms", name: "CMS & Apps", members: Some(&["ghost", "nextcloud"]) },
    Category {
        id: "utilities",
        name: "Utilities",
        members: Some(&["portainer", "vault"]),
    },
];

type PortSpec<'a> = &'a [(&'a str, &'a str)];
type VolumeSpec<'a> = &'a [(&'a str, &'a str, bool)];
type EnvSpec<'a> = &'a [(&'a str, &'a str)];

#[allow(clippy::too_many_arguments)]
fn builtin(
    (id, name, description, color): (&str, &str, &str, &str),
    image: &str,
    ports: PortSpec,
    volumes: VolumeSpec,
    env: EnvSpec,
    restart_policy: &str,
    command: &str,
    (memory_limit, cpu_limit): (&str, &str),
) -> Template {
    Template {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        color: color.to_string(),
        image: image.to_string(),
        ports: ports
            .iter()
            .map(|(c, h)| TemplatePort {
                container_port: c.to_string(),
                host_port: h.to_string(),
            })
            .collect(),
        volumes: volumes
            .iter()
            .map(|(s, t, ro)| TemplateVolume {
                source: s.to_string(),
                target: t.to_string(),
                readonly: *ro,
            })
            .collect(),
        env_vars: env
            .iter()
            .map(|(k, v)| TemplateEnvVar {
                key: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
        network: default_network(),
        restart_policy: restart_policy.to_string(),
        command: command.to_string(),
        memory_limit: memory_limit.to_string(),
        cpu_limit: cpu_limit.to_string(),
        is_custom: false,
    }
}

const US: &str = "unless-stopped";
const SOCK: &str = "/var/run/docker.sock";

static BUILTIN_TEMPLATES: LazyLock<Vec<Template>> = LazyLock::new(|| {
    vec![
        builtin(
            ("postgres", "PostgreSQL", "PostgreSQL relational database", "#336791"),
            "postgres:latest",
            &[("5432/tcp", "5432")],
            &[("postgres-data", "/var/lib/postgresql/data", false)],
            &[
                ("POSTGRES_PASSWORD", "postgres"),
                ("POSTGRES_USER", "postgres"),
                ("POSTGRES_DB", "mydb"),
            ],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("mysql", "MySQL", "MySQL relational database", "#00758F"),
            "mysql:latest",
            &[("3306/tcp", "3306")],
            &[("mysql-data", "/var/lib/mysql", false)],
            &[
                ("MYSQL_ROOT_PASSWORD", "rootpassword"),
                ("MYSQL_DATABASE", "mydb"),
                ("MYSQL_USER", "user"),
                ("MYSQL_PASSWORD", "password"),
            ],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("redis", "Redis", "In-memory data structure store", "#DC382D"),
            "redis:latest",
            &[("6379/tcp", "6379")],
            &[("redis-data", "/data", false)],
            &[],
            US,
            "redis-server --appendonly yes",
            ("256", "0.5"),
        ),
        builtin(
            ("mongodb", "MongoDB", "NoSQL document database", "#47A248"),
            "mongo:latest",
            &[("27017/tcp", "27017")],
            &[("mongo-data", "/data/db", false)],
            &[
                ("MONGO_INITDB_ROOT_USERNAME", "admin"),
                ("MONGO_INITDB_ROOT_PASSWORD", "password"),
            ],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("nginx", "Nginx", "Web server and reverse proxy", "#009639"),
            "nginx:latest",
            &[("80/tcp", "80"), ("443/tcp", "443")],
            &[
                ("nginx-html", "/usr/share/nginx/html", false),
                ("nginx-conf", "/etc/nginx/nginx.conf", true),
            ],
            &[],
            US,
            "",
            ("128", "0.5"),
        ),
        builtin(
            ("elasticsearch", "Elasticsearch", "Search and analytics engine", "#005571"),
            "elasticsearch:8.11.0",
            &[("9200/tcp", "9200"), ("9300/tcp", "9300")],
            &[("es-data", "/usr/share/elasticsearch/data", false)],
            &[
                ("discovery.type", "single-node"),
                ("ES_JAVA_OPTS", "-Xms512m -Xmx512m"),
                ("xpack.security.enabled", "false"),
            ],
            US,
            "",
            ("1024", "2"),
        ),
        builtin(
            ("rabbitmq", "RabbitMQ", "Message broker", "#FF6600"),
            "rabbitmq:3-management",
            &[("5672/tcp", "5672"), ("15672/tcp", "15672")],
            &[("rabbitmq-data", "/var/lib/rabbitmq", false)],
            &[
                ("RABBITMQ_DEFAULT_USER", "admin"),
                ("RABBITMQ_DEFAULT_PASS", "password"),
            ],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("node", "Node.js", "JavaScript runtime environment", "#339933"),
            "node:20-alpine",
            &[("3000/tcp", "3000")],
            &[(".", "/app", false)],
            &[("NODE_ENV", "development")],
            "no",
            "/bin/sh",
            ("512", "1"),
        ),
        builtin(
            ("python", "Python", "Python runtime environment", "#3776AB"),
            "python:3.11-slim",
            &[("8000/tcp", "8000")],
            &[(".", "/app", false)],
            &[("PYTHONUNBUFFERED", "1")],
            "no",
            "/bin/bash",
            ("512", "1"),
        ),
        builtin(
            ("mariadb", "MariaDB", "MySQL-compatible database", "#003545"),
            "mariadb:latest",
            &[("3306/tcp", "3307")],
            &[("mariadb-data", "/var/lib/mysql", false)],
            &[
                ("MARIADB_ROOT_PASSWORD", "rootpassword"),
                ("MARIADB_DATABASE", "mydb"),
                ("MARIADB_USER", "user"),
                ("MARIADB_PASSWORD", "password"),
            ],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("memcached", "Memcached", "In-memory caching system", "#4A90E2"),
            "memcached:latest",
            &[("11211/tcp", "11211")],
            &[],
            &[],
            US,
            "memcached -m 64",
            ("128", "0.5"),
        ),
        builtin(
            ("apache", "Apache", "HTTP web server", "#D22128"),
            "httpd:latest",
            &[("80/tcp", "8080")],
            &[("apache-html", "/usr/local/apache2/htdocs", false)],
            &[],
            US,
            "",
            ("256", "0.5"),
        ),
        builtin(
            ("ghost", "Ghost", "Modern publishing platform", "#15171A"),
            "ghost:latest",
            &[("2368/tcp", "2368")],
            &[("ghost-data", "/var/lib/ghost/content", false)],
            &[
                ("url", "http://localhost:2368"),
                ("database__client", "sqlite3"),
            ],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("nextcloud", "Nextcloud", "Self-hosted cloud storage", "#0082C9"),
            "nextcloud:latest",
            &[("80/tcp", "8085")],
            &[("nextcloud-data", "/var/www/html", false)],
            &[],
            US,
            "",
            ("1024", "1"),
        ),
        builtin(
            ("traefik", "Traefik", "Modern reverse proxy", "#24A1C1"),
            "traefik:latest",
            &[("80/tcp", "8086"), ("8080/tcp", "8087")],
            &[(SOCK, SOCK, true)],
            &[],
            US,
            "--api.insecure=true --providers.docker",
            ("256", "0.5"),
        ),
        builtin(
            ("caddy", "Caddy", "Web server with auto HTTPS", "#1F88C0"),
            "caddy:latest",
            &[("80/tcp", "8088"), ("443/tcp", "8444")],
            &[("caddy-data", "/data", false), ("caddy-config", "/config", false)],
            &[],
            US,
            "",
            ("256", "0.5"),
        ),
        builtin(
            ("haproxy", "HAProxy", "Load balancer", "#106DA9"),
            "haproxy:latest",
            &[("80/tcp", "8089"), ("8404/tcp", "8404")],
            &[("haproxy-config", "/usr/local/etc/haproxy/haproxy.cfg", true)],
            &[],
            US,
            "",
            ("256", "0.5"),
        ),
        builtin(
            ("golang", "Go", "Go programming language", "#00ADD8"),
            "golang:latest",
            &[("8080/tcp", "8090")],
            &[(".", "/go/src/app", false)],
            &[],
            "no",
            "/bin/bash",
            ("512", "1"),
        ),
        builtin(
            ("rust", "Rust", "Rust programming language", "#CE422B"),
            "rust:latest",
            &[("8080/tcp", "8091")],
            &[(".", "/usr/src/app", false)],
            &[],
            "no",
            "/bin/bash",
            ("512", "1"),
        ),
        builtin(
            ("php", "PHP", "PHP with Apache", "#777BB4"),
            "php:apache",
            &[("80/tcp", "8092")],
            &[(".", "/var/www/html", false)],
            &[],
            US,
            "",
            ("512", "1"),
        ),
        builtin(
            ("ruby", "Ruby", "Ruby programming language", "#CC342D"),
            "ruby:latest",
            &[("3000/tcp", "3002")],
            &[(".", "/app", false)],
            &[],
            "no",
            "/bin/bash",
            ("512", "1"),
        ),
        builtin(
            ("portainer", "Portainer", "Docker management UI", "#13BEF9"),
            "portainer/portainer-ce:latest",
            &[("9000/tcp", "9003"), ("8000/tcp", "8001")],
            &[(SOCK, SOCK, false), ("portainer-data", "/data", false)],
            &[],
            US,
            "",
            ("256", "0.5"),
        ),
        builtin(
            ("registry", "Docker Registry", "Private Docker registry", "#384D54"),
            "registry:2",
            &[("5000/tcp", "5000")],
            &[("registry-data", "/var/lib/registry", false)],
            &[],
            US,
            "",
            ("256", "0.5"),
        ),
        builtin(
            ("vault", "HashiCorp Vault", "Secrets management", "#000000"),
            "hashicorp/vault:latest",
            &[("8200/tcp", "8200")],
            &[("vault-data", "/vault/file", false)],
            &[
                ("VAULT_DEV_ROOT_TOKEN_ID", "root"),
                ("VAULT_DEV_LISTEN_ADDRESS", "0.0.0.0:8200"),
            ],
            US,
            "server -dev",
            ("512", "1"),
        ),
        builtin(
            ("adminer", "Adminer", "Database management UI", "#34567C"),
            "adminer:latest",
            &[("8080/tcp", "8093")],
            &[],
            &[],
            US,
            "",
            ("128", "0.5"),
        ),
    ]
});

pub fn builtin_templates() -> &'static [Template] {
    &BUILTIN_TEMPLATES
}

// ============================================================================
// Template Store
// ============================================================================

/// Built-in catalogue plus the persisted user templates.
pub struct TemplateStore {
    path: Option<PathBuf>,
    custom: Vec<Template>,
}

impl TemplateStore {
    /// Load user templates from `path`. A missing file is an empty collection.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let custom: Vec<Template> = load_json(&path)?.unwrap_or_default();
        debug!("Loaded {} custom templates from {}", custom.len(), path.display());
        Ok(Self {
            path: Some(path),
            custom,
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            custom: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Built-ins first, then user templates in insertion order.
    pub fn all(&self) -> Vec<&Template> {
        builtin_templates().iter().chain(self.custom.iter()).collect()
    }

    pub fn custom(&self) -> &[Template] {
        &self.custom
    }

    pub fn by_category(&self, category: &str) -> Result<Vec<&Template>> {
        let entry = CATEGORIES
            .iter()
            .find(|c| c.id == category)
            .ok_or_else(|| Error::validation(format!("Unknown template category: {}", category)))?;

        Ok(match (entry.id, entry.members) {
            ("custom", _) => self.custom.iter().collect(),
            (_, None) => self.all(),
            (_, Some(members)) => self
                .all()
                .into_iter()
                .filter(|t| members.contains(&t.id.as_str()))
                .collect(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        builtin_templates()
            .iter()
            .chain(self.custom.iter())
            .find(|t| t.id == id)
    }

    /// Store `template` as a user template under a freshly generated id.
    pub fn add(&mut self, mut template: Template) -> Result<&Template> {
        template.id = format!("custom-{}", Uuid::new_v4());
        template.is_custom = true;
        info!("Adding custom template {} ({})", template.name, template.id);
        let mut next = self.custom.clone();
        next.push(template);
        self.commit(next)?;
        // just pushed
        Ok(&self.custom[self.custom.len() - 1])
    }

    /// Built-in templates cannot be deleted.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let next: Vec<Template> = self.custom.iter().filter(|t| t.id != id).cloned().collect();
        if next.len() == self.custom.len() {
            return Err(Error::validation(format!("No custom template with id {}", id)));
        }
        self.commit(next)?;
        info!("Deleted custom template {}", id);
        Ok(())
    }

    pub fn export(&self, id: &str) -> Result<String> {
        let template = self
            .get(id)
            .ok_or_else(|| Error::validation(format!("No template with id {}", id)))?;
        serde_json::to_string_pretty(template)
            .map_err(|e| Error::Storage(format!("failed to serialize template: {}", e)))
    }

    pub fn export_all(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.custom)
            .map_err(|e| Error::Storage(format!("failed to serialize templates: {}", e)))
    }

    /// Import one exported template. It becomes a user template with a new id.
    pub fn import(&mut self, json: &str) -> Result<&Template> {
        let template: Template = serde_json::from_str(json)
            .map_err(|e| Error::validation(format!("Invalid template JSON: {}", e)))?;
        self.add(template)
    }

    /// Import an exported array. Returns how many templates were added.
    pub fn import_all(&mut self, json: &str) -> Result<usize> {
        let templates: Vec<Template> = serde_json::from_str(json)
            .map_err(|e| Error::validation(format!("Invalid template list JSON: {}", e)))?;
        let count = templates.len();
        let mut next = self.custom.clone();
        for mut template in templates {
            template.id = format!("custom-{}", Uuid::new_v4());
            template.is_custom = true;
            next.push(template);
        }
        self.commit(next)?;
        info!("Imported {} custom templates", count);
        Ok(count)
    }

    /// Write `next` to disk, then adopt it. A failed write changes nothing.
    fn commit(&mut self, next: Vec<Template>) -> Result<()> {
        if let Some(path) = &self.path {
            save_json(path, &next)?;
        }
        self.custom = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_unique_and_categorized() {
        let ids: Vec<&str> = builtin_templates().iter().map(|t| t.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());

        for category in CATEGORIES {
            for member in category.members.unwrap_or_default() {
                assert!(ids.contains(member), "{} missing from catalogue", member);
            }
        }
    }

    #[test]
    fn test_builtins_produce_valid_specs() {
        for template in builtin_templates() {
            let spec = template.to_create_spec();
            assert!(spec.validate().is_ok(), "{} failed validation", template.id);
        }
    }

    #[test]
    fn test_to_create_spec() {
        let redis = builtin_templates().iter().find(|t| t.id == "redis").unwrap();
        let spec = redis.to_create_spec();
        assert_eq!(spec.image, "redis:latest");
        assert_eq!(spec.ports.get("6379/tcp").map(String::as_str), Some("6379"));
        assert_eq!(spec.volumes, vec!["redis-data:/data".to_string()]);
        assert_eq!(spec.network, None);
        assert_eq!(spec.restart_policy.as_deref(), Some("unless-stopped"));
        assert_eq!(
            spec.command,
            Some(vec!["redis-server".into(), "--appendonly".into(), "yes".into()])
        );
        assert_eq!(spec.memory_limit, Some(256 * 1024 * 1024));
        assert_eq!(spec.cpu_quota, Some(50_000));
    }

    #[test]
    fn test_to_create_spec_drops_incomplete_entries() {
        let mut template = builtin_templates()[0].clone();
        template.ports.push(TemplatePort {
            container_port: "9000".into(),
            host_port: "9000".into(),
        });
        template.ports.push(TemplatePort {
            container_port: "9001".into(),
            host_port: String::new(),
        });
        template.env_vars.push(TemplateEnvVar {
            key: String::new(),
            value: "orphan".into(),
        });
        template.restart_policy = "no".into();
        template.network = "backend".into();
        template.memory_limit = "lots".into();
        template.command = "   ".into();

        let spec = template.to_create_spec();
        assert!(spec.ports.contains_key("9000/tcp"));
        assert!(!spec.ports.contains_key("9001/tcp"));
        assert!(spec.env.iter().all(|e| !e.starts_with('=')));
        assert_eq!(spec.restart_policy, None);
        assert_eq!(spec.network.as_deref(), Some("backend"));
        assert_eq!(spec.memory_limit, None);
        assert_eq!(spec.command, None);
    }

    #[test]
    fn test_by_category() {
        let mut store = TemplateStore::in_memory();
        let mut mine = builtin_templates()[2].clone();
        mine.name = "My Redis".into();
        store.add(mine).unwrap();

        let cache: Vec<&str> = store
            .by_category("cache")
            .unwrap()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(cache, vec!["redis", "memcached"]);
        assert_eq!(store.by_category("custom").unwrap().len(), 1);
        assert_eq!(store.by_category("all").unwrap().len(), builtin_templates().len() + 1);
        assert!(store.by_category("games").is_err());
    }

    #[test]
    fn test_delete_rejects_builtin() {
        let mut store = TemplateStore::in_memory();
        assert!(store.delete("postgres").is_err());
        assert!(store.get("postgres").is_some());
    }

    #[test]
    fn test_import_marks_custom() {
        let mut store = TemplateStore::in_memory();
        let json = store.export("nginx").unwrap();
        assert!(json.contains("\"containerPort\""));

        let imported = store.import(&json).unwrap().clone();
        assert!(imported.is_custom);
        assert!(imported.id.starts_with("custom-"));
        assert_eq!(imported.image, "nginx:latest");
        assert!(store.import("{not json").is_err());
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");

        let id = {
            let mut store = TemplateStore::open(&path).unwrap();
            let id = store.add(builtin_templates()[0].clone()).unwrap().id.clone();
            store.add(builtin_templates()[1].clone()).unwrap();
            id
        };

        let mut reopened = TemplateStore::open(&path).unwrap();
        assert_eq!(reopened.custom().len(), 2);
        reopened.delete(&id).unwrap();

        let again = TemplateStore::open(&path).unwrap();
        assert_eq!(again.custom().len(), 1);
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let mut store = TemplateStore::open(blocker.join("templates.json")).unwrap();
        let builtin = builtin_templates()[0].clone();

        assert!(matches!(store.add(builtin.clone()), Err(Error::Storage(_))));
        assert!(store.custom().is_empty());

        let exported = serde_json::to_string(&vec![builtin]).unwrap();
        assert!(store.import_all(&exported).is_err());
        assert!(store.custom().is_empty());
    }

    #[test]
    fn test_failed_delete_keeps_template() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let mut store = TemplateStore::open(sub.join("templates.json")).unwrap();
        let id = store.add(builtin_templates()[0].clone()).unwrap().id.clone();

        std::fs::remove_dir_all(&sub).unwrap();
        std::fs::write(&sub, b"").unwrap();

        assert!(matches!(store.delete(&id), Err(Error::Storage(_))));
        assert!(store.get(&id).is_some());
        assert_eq!(store.custom().len(), 1);
    }
}
