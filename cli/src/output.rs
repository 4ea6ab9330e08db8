use anyhow::Result;
use serde::Serialize;

use dock_core::{
    CachedSnapshot, ContainerRecord, Deployment, ProvisioningSession, StartAllReport,
};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success() {
    println!("{}", r#"{"success":true}"#);
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn ports_column(container: &ContainerRecord) -> String {
    container
        .ports
        .iter()
        .map(|p| match p.public_port {
            Some(public) => format!("{}->{}/{}", public, p.private_port, p.port_type),
            None => format!("{}/{}", p.private_port, p.port_type),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_containers(containers: &[ContainerRecord]) {
    println!(
        "{:<14}{:<24}{:<28}{:<12}{:<22}{}",
        "ID", "NAME", "IMAGE", "STATE", "STATUS", "PORTS"
    );
    for c in containers {
        println!(
            "{:<14}{:<24}{:<28}{:<12}{:<22}{}",
            short_id(&c.id),
            c.name,
            c.image,
            c.state,
            c.status,
            ports_column(c)
        );
    }
}

/// Render one cached snapshot for `watch`.
pub fn print_snapshot(snapshot: &CachedSnapshot) -> Result<()> {
    let stamp = snapshot.refreshed_at();
    println!(
        "--- refreshed {:02}:{:02}:{:02} UTC ---",
        stamp.hour(),
        stamp.minute(),
        stamp.second()
    );
    match snapshot {
        CachedSnapshot::Containers(s) => print_containers(&s.data),
        CachedSnapshot::Images(s) => print_json(&s.data)?,
        CachedSnapshot::Volumes(s) => print_json(&s.data)?,
        CachedSnapshot::Networks(s) => print_json(&s.data)?,
        CachedSnapshot::Detail(s) => print_json(&s.data)?,
        CachedSnapshot::Stats(s) => println!(
            "cpu {:.2}%  mem {} / {} ({:.2}%)  net rx {} tx {}",
            s.data.cpu_usage,
            s.data.memory_usage,
            s.data.memory_limit,
            s.data.memory_percent,
            s.data.network_rx,
            s.data.network_tx
        ),
        CachedSnapshot::Logs(s) => println!("{}", s.data),
    }
    Ok(())
}

pub fn print_progress(session: &ProvisioningSession) {
    println!("[{:?}] {}", session.phase, session.message);
}

pub fn print_deployment(deployment: &Deployment) {
    for result in &deployment.results {
        match (&result.container_id, &result.error) {
            (Some(id), _) => println!("  created  {:<24}{}", result.service_name, short_id(id)),
            (None, Some(e)) => println!("  failed   {:<24}{}", result.service_name, e),
            (None, None) => println!("  failed   {}", result.service_name),
        }
    }
    println!(
        "{} created, {} failed",
        deployment.successes().count(),
        deployment.failures().count()
    );
}

pub fn print_start_report(report: &StartAllReport) {
    for name in &report.started {
        println!("  started  {}", name);
    }
    for (name, e) in &report.failed {
        println!("  failed   {:<24}{}", name, e);
    }
    println!(
        "{} of {} containers started",
        report.started.len(),
        report.attempted
    );
}
