//! Host status report

use sysinfo::{Disks, System};

/// Short text report: host, uptime, CPU, memory and root disk.
///
/// Samples CPU usage twice, so this blocks for a few hundred milliseconds.
pub fn system_report() -> String {
    let mut system = System::new();
    system.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    system.refresh_cpu_usage();
    system.refresh_memory();

    let host = System::host_name().unwrap_or_else(|| "unknown host".to_string());
    let os = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());

    let mut lines = vec![
        format!("🖥️ {} ({})", host, os),
        format!("⏱️ Uptime: {}", format_uptime(System::uptime())),
        format!(
            "🧠 CPU: {:.1}% ({} cores)",
            system.global_cpu_usage(),
            system.cpus().len()
        ),
        format!(
            "💾 Memory: {}",
            usage_line(system.used_memory(), system.total_memory())
        ),
    ];

    let disks = Disks::new_with_refreshed_list();
    let root_disk = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.list().first());
    if let Some(disk) = root_disk {
        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        lines.push(format!(
            "💽 Disk ({}): {}",
            disk.mount_point().display(),
            usage_line(used, total)
        ));
    }

    lines.join("\n")
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

fn usage_line(used: u64, total: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let percent = if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    };
    format!(
        "{:.1} / {:.1} GB ({:.0}%)",
        used as f64 / GB,
        total as f64 / GB,
        percent
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3_660), "1h 1m");
        assert_eq!(format_uptime(3 * 86_400 + 4 * 3_600 + 12 * 60), "3d 4h 12m");
    }

    #[test]
    fn test_usage_line() {
        let gb = 1024 * 1024 * 1024;
        assert_eq!(usage_line(4 * gb, 16 * gb), "4.0 / 16.0 GB (25%)");
        assert_eq!(usage_line(0, 0), "0.0 / 0.0 GB (0%)");
    }

    #[test]
    fn test_system_report_sections() {
        let report = system_report();
        assert!(report.contains("Uptime:"));
        assert!(report.contains("CPU:"));
        assert!(report.contains("Memory:"));
    }
}
