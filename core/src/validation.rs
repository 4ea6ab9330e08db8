//! Local input checks run before any engine call.

use crate::error::{Error, Result};
use crate::types::CreateContainerSpec;

const MAX_NAME_LEN: usize = 255;
const MAX_CPUS: f64 = 1024.0;
pub const CPU_QUOTA_PER_CORE: i64 = 100_000;

const RESTART_POLICIES: [&str; 4] = ["no", "always", "unless-stopped", "on-failure"];

/// Container, volume and network names.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("Name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::validation("Name too long (max 255 characters)"));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first_ok || !rest_ok {
        return Err(Error::validation(format!(
            "Invalid name {:?}: must start with alphanumeric and contain only alphanumeric, hyphens, underscores, or dots",
            name
        )));
    }
    Ok(())
}

pub fn validate_image_name(image: &str) -> Result<()> {
    if image.is_empty() {
        return Err(Error::validation("Image name cannot be empty"));
    }
    if image.len() > MAX_NAME_LEN {
        return Err(Error::validation("Image name too long"));
    }
    if image.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!(
            "Invalid image {:?}: contains whitespace",
            image
        )));
    }
    let reference = image.split('@').next().unwrap_or(image);
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    if last_segment.is_empty() || last_segment.matches(':').count() > 1 {
        return Err(Error::validation(format!("Invalid image format {:?}", image)));
    }
    if last_segment.starts_with(':') || last_segment.ends_with(':') {
        return Err(Error::validation(format!("Invalid image format {:?}", image)));
    }
    Ok(())
}

pub fn validate_port_string(port: &str) -> Result<u16> {
    match port.trim().parse::<u16>() {
        Ok(0) => Err(Error::validation("Port number cannot be 0")),
        Ok(p) => Ok(p),
        Err(_) => Err(Error::validation(format!("Invalid port number: {}", port))),
    }
}

pub fn validate_env_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation("Environment variable name cannot be empty"));
    }
    let mut chars = key.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    // Dots are accepted after the first character (`discovery.type`).
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.')) {
        return Err(Error::validation(format!(
            "Invalid environment variable name: {} (must start with letter/underscore, contain only alphanumeric/underscore/dot)",
            key
        )));
    }
    Ok(())
}

/// Container-side mount target.
pub fn validate_volume_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::validation("Volume path cannot be empty"));
    }
    if path.contains("..") {
        return Err(Error::validation(
            "Volume path cannot contain '..' (directory traversal)",
        ));
    }
    if !path.starts_with('/') {
        return Err(Error::validation("Volume path must be absolute (start with /)"));
    }
    Ok(())
}

/// `source:target[:ro|rw]`
pub fn validate_volume_spec(spec: &str) -> Result<()> {
    let parts: Vec<&str> = spec.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(Error::validation(format!(
            "Invalid volume {:?}: expected source:target[:ro]",
            spec
        )));
    }
    let source = parts[0];
    if source.is_empty() {
        return Err(Error::validation(format!("Invalid volume {:?}: empty source", spec)));
    }
    if source.starts_with('/') || source.starts_with('.') {
        if source.contains("/..") || source.starts_with("..") {
            return Err(Error::validation(
                "Volume source cannot contain '..' (directory traversal)",
            ));
        }
    } else {
        validate_name(source)?;
    }
    validate_volume_path(parts[1])?;
    if let Some(mode) = parts.get(2) {
        if !matches!(*mode, "ro" | "rw") {
            return Err(Error::validation(format!(
                "Invalid volume mode {:?}: expected ro or rw",
                mode
            )));
        }
    }
    Ok(())
}

pub fn validate_network_name(network: &str) -> Result<()> {
    if network.is_empty() {
        return Err(Error::validation("Network name cannot be empty"));
    }
    if matches!(network, "bridge" | "host" | "none") || network.starts_with("container:") {
        return Ok(());
    }
    validate_name(network)
}

pub fn validate_restart_policy(policy: &str) -> Result<()> {
    let base = policy.split(':').next().unwrap_or(policy);
    if RESTART_POLICIES.contains(&base) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Invalid restart policy {:?}: expected one of {}",
            policy,
            RESTART_POLICIES.join(", ")
        )))
    }
}

/// Parse "512m", "1g", "64k" or plain bytes. Blank input means no limit.
pub fn parse_memory_limit(limit: &str) -> Result<Option<i64>> {
    let lower = limit.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return Ok(None);
    }
    let trimmed = lower.strip_suffix('b').unwrap_or(&lower);
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('k') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed, 1),
    };
    digits
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|v| *v > 0)
        .and_then(|v| v.checked_mul(multiplier))
        .map(Some)
        .ok_or_else(|| {
            Error::validation(format!(
                "Memory limit {:?} must be a number or include suffix (k, m, g)",
                limit
            ))
        })
}

pub fn validate_cpu_limit(cpus: f64) -> Result<()> {
    if cpus.is_nan() || cpus <= 0.0 {
        return Err(Error::validation("CPU limit must be positive"));
    }
    if cpus > MAX_CPUS {
        return Err(Error::validation(
            "CPU limit unreasonably high (max 1024 cores)",
        ));
    }
    Ok(())
}

/// Cores to engine cpu quota.
pub fn cpus_to_quota(cpus: f64) -> Result<i64> {
    validate_cpu_limit(cpus)?;
    Ok((cpus * CPU_QUOTA_PER_CORE as f64).round() as i64)
}

impl CreateContainerSpec {
    /// Check every field locally. Nothing here talks to the engine.
    pub fn validate(&self) -> Result<()> {
        validate_image_name(&self.image)?;
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        for (container_port, host_port) in &self.ports {
            let port = container_port.split('/').next().unwrap_or(container_port);
            validate_port_string(port)?;
            validate_port_string(host_port)?;
        }
        for volume in &self.volumes {
            validate_volume_spec(volume)?;
        }
        for entry in &self.env {
            let key = entry.split('=').next().unwrap_or_default();
            validate_env_key(key)?;
        }
        if let Some(network) = &self.network {
            validate_network_name(network)?;
        }
        if let Some(policy) = &self.restart_policy {
            validate_restart_policy(policy)?;
        }
        if let Some(command) = &self.command {
            if command.is_empty() {
                return Err(Error::validation("Command cannot be an empty token list"));
            }
        }
        if let Some(memory) = self.memory_limit {
            if memory <= 0 {
                return Err(Error::validation("Memory limit must be positive"));
            }
        }
        if let Some(quota) = self.cpu_quota {
            validate_cpu_limit(quota as f64 / CPU_QUOTA_PER_CORE as f64)?;
        }
        Ok(())
    }
}
