//! Compose-file parsing into per-service creation specs.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::CreateContainerSpec;
use crate::validation::{cpus_to_quota, parse_memory_limit};

#[derive(Debug, Deserialize)]
struct ComposeFile {
    services: Option<Mapping>,
}

#[derive(Debug, Default, Deserialize)]
struct ComposeService {
    image: Option<String>,
    container_name: Option<String>,
    environment: Option<Environment>,
    #[serde(default)]
    ports: Vec<Value>,
    #[serde(default)]
    volumes: Vec<String>,
    networks: Option<Networks>,
    restart: Option<String>,
    command: Option<Command>,
    mem_limit: Option<Value>,
    cpus: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Environment {
    List(Vec<String>),
    Map(Mapping),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Networks {
    List(Vec<String>),
    Map(Mapping),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Command {
    Line(String),
    Tokens(Vec<String>),
}

/// One service of a parsed compose file. `spec` is an error message when the
/// service itself is unusable; the rest of the file is still deployable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub spec: std::result::Result<CreateContainerSpec, String>,
}

/// Services in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub services: Vec<ServiceSpec>,
}

impl ComposeProject {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::validation("Compose file is empty"));
        }
        let file: ComposeFile = serde_yaml::from_str(text)
            .map_err(|e| Error::validation(format!("Failed to parse compose file: {}", e)))?;
        let services = file
            .services
            .ok_or_else(|| Error::validation("Compose file has no services section"))?;
        if services.is_empty() {
            return Err(Error::validation("Compose file defines no services"));
        }

        let services = services
            .into_iter()
            .map(|(key, value)| {
                let name = scalar_to_string(&key);
                let spec = serde_yaml::from_value::<Option<ComposeService>>(value)
                    .map_err(|e| format!("Invalid service definition: {}", e))
                    .and_then(|service| service_to_spec(&name, service.unwrap_or_default()));
                ServiceSpec { name, spec }
            })
            .collect();

        Ok(Self { services })
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn service_to_spec(
    name: &str,
    service: ComposeService,
) -> std::result::Result<CreateContainerSpec, String> {
    let image = service
        .image
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| "No image specified".to_string())?;

    let mut ports = BTreeMap::new();
    for entry in &service.ports {
        let entry = scalar_to_string(entry);
        let parts: Vec<&str> = entry.split(':').collect();
        if let [host, container] = parts.as_slice() {
            let key = if container.contains('/') {
                container.to_string()
            } else {
                format!("{}/tcp", container)
            };
            ports.insert(key, host.to_string());
        }
    }

    let env = match service.environment {
        None => Vec::new(),
        Some(Environment::List(list)) => list,
        Some(Environment::Map(map)) => map
            .iter()
            .map(|(k, v)| format!("{}={}", scalar_to_string(k), scalar_to_string(v)))
            .collect(),
    };

    let network = match service.networks {
        Some(Networks::List(list)) => list.into_iter().next(),
        Some(Networks::Map(map)) => map.keys().next().map(scalar_to_string),
        None => None,
    };

    let command = match service.command {
        None => None,
        Some(Command::Tokens(tokens)) => Some(tokens),
        Some(Command::Line(line)) => Some(
            shell_words::split(&line).map_err(|e| format!("Invalid command {:?}: {}", line, e))?,
        ),
    }
    .filter(|tokens| !tokens.is_empty());

    let memory_limit = match &service.mem_limit {
        Some(value) => parse_memory_limit(&scalar_to_string(value)).map_err(|e| e.to_string())?,
        None => None,
    };

    let cpu_quota = match &service.cpus {
        Some(value) => {
            let text = scalar_to_string(value);
            let cpus: f64 = text
                .trim()
                .parse()
                .map_err(|_| format!("Invalid cpus value {:?}", text))?;
            Some(cpus_to_quota(cpus).map_err(|e| e.to_string())?)
        }
        None => None,
    };

    Ok(CreateContainerSpec {
        image,
        name: Some(service.container_name.unwrap_or_else(|| name.to_string())),
        ports,
        volumes: service.volumes,
        env,
        network,
        restart_policy: service.restart,
        command,
        memory_limit,
        cpu_quota,
    })
}
