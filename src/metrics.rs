//! Stats snapshots and metrics export

use std::collections::HashMap;
use std::time::Duration;

/// Point-in-time view of a pool's bookkeeping.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Entries with at least one outstanding checkout
    pub active_count: usize,

    /// Fully released entries awaiting expiry
    pub idle_count: usize,

    /// Configured idle time-to-live
    pub ttl: Duration,

    /// Configured idle-set size bound
    pub max_idle_size: usize,
}

impl PoolStats {
    /// Export stats as a flat string map
    pub fn export(&self) -> HashMap<String, String> {
        let mut stats = HashMap::new();
        stats.insert("active_count".to_string(), self.active_count.to_string());
        stats.insert("idle_count".to_string(), self.idle_count.to_string());
        stats.insert("ttl_seconds".to_string(), self.ttl.as_secs().to_string());
        stats.insert("max_idle_size".to_string(), self.max_idle_size.to_string());
        stats
    }
}

/// Point-in-time view of a registry.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Distinct (name, config) pairs registered
    pub total_registered: usize,

    /// Successful entity constructions so far
    pub total_creations: u64,

    /// Registered ids per logical name
    pub per_name_counts: HashMap<String, usize>,

    /// Whether unregistered pairs are registered on the fly
    pub auto_register: bool,
}

impl RegistryStats {
    /// Export stats as a flat string map
    pub fn export(&self) -> HashMap<String, String> {
        let mut stats = HashMap::new();
        stats.insert(
            "total_registered".to_string(),
            self.total_registered.to_string(),
        );
        stats.insert(
            "total_creations".to_string(),
            self.total_creations.to_string(),
        );
        stats.insert("auto_register".to_string(), self.auto_register.to_string());
        for (name, count) in &self.per_name_counts {
            stats.insert(format!("registered_{name}"), count.to_string());
        }
        stats
    }
}

/// Exporter for Prometheus exposition format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export pool stats in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use handlepool::{MetricsExporter, PoolStats};
    /// use std::collections::HashMap;
    /// use std::time::Duration;
    ///
    /// let stats = PoolStats {
    ///     active_count: 2,
    ///     idle_count: 1,
    ///     ttl: Duration::from_secs(3600),
    ///     max_idle_size: 100,
    /// };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&stats, "llm_clients", Some(&tags));
    /// assert!(output.contains("handlepool_entries_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        stats: &PoolStats,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels("pool", pool_name, tags);

        output.push_str("# HELP handlepool_entries_active Entries with outstanding checkouts\n");
        output.push_str("# TYPE handlepool_entries_active gauge\n");
        output.push_str(&format!(
            "handlepool_entries_active{{{}}} {}\n",
            labels, stats.active_count
        ));

        output.push_str("# HELP handlepool_entries_idle Fully released entries awaiting expiry\n");
        output.push_str("# TYPE handlepool_entries_idle gauge\n");
        output.push_str(&format!(
            "handlepool_entries_idle{{{}}} {}\n",
            labels, stats.idle_count
        ));

        output.push_str("# HELP handlepool_idle_capacity Configured idle-set size bound\n");
        output.push_str("# TYPE handlepool_idle_capacity gauge\n");
        output.push_str(&format!(
            "handlepool_idle_capacity{{{}}} {}\n",
            labels, stats.max_idle_size
        ));

        output.push_str("# HELP handlepool_ttl_seconds Configured idle time-to-live\n");
        output.push_str("# TYPE handlepool_ttl_seconds gauge\n");
        output.push_str(&format!(
            "handlepool_ttl_seconds{{{}}} {}\n",
            labels,
            stats.ttl.as_secs()
        ));

        output
    }

    /// Export registry stats in Prometheus exposition format
    pub fn export_registry_prometheus(
        stats: &RegistryStats,
        registry_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels("registry", registry_name, tags);

        output.push_str("# HELP handlepool_registered_entries Distinct registered (name, config) pairs\n");
        output.push_str("# TYPE handlepool_registered_entries gauge\n");
        output.push_str(&format!(
            "handlepool_registered_entries{{{}}} {}\n",
            labels, stats.total_registered
        ));

        output.push_str("# HELP handlepool_creations_total Successful entity constructions\n");
        output.push_str("# TYPE handlepool_creations_total counter\n");
        output.push_str(&format!(
            "handlepool_creations_total{{{}}} {}\n",
            labels, stats.total_creations
        ));

        output.push_str("# HELP handlepool_registered_by_name Registered ids per logical name\n");
        output.push_str("# TYPE handlepool_registered_by_name gauge\n");
        for (name, count) in &stats.per_name_counts {
            output.push_str(&format!(
                "handlepool_registered_by_name{{{},name=\"{}\"}} {}\n",
                labels, name, count
            ));
        }

        output
    }

    fn format_labels(
        kind: &str,
        name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut labels = vec![format!("{}=\"{}\"", kind, name)];

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_stats() -> PoolStats {
        PoolStats {
            active_count: 3,
            idle_count: 2,
            ttl: Duration::from_secs(3600),
            max_idle_size: 100,
        }
    }

    #[test]
    fn pool_export_contains_every_knob() {
        let exported = pool_stats().export();
        assert_eq!(exported.get("active_count").map(String::as_str), Some("3"));
        assert_eq!(exported.get("idle_count").map(String::as_str), Some("2"));
        assert_eq!(exported.get("ttl_seconds").map(String::as_str), Some("3600"));
        assert_eq!(exported.get("max_idle_size").map(String::as_str), Some("100"));
    }

    #[test]
    fn prometheus_output_is_labelled() {
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "test".to_string());

        let output = MetricsExporter::export_prometheus(&pool_stats(), "clients", Some(&tags));
        assert!(output.contains("handlepool_entries_active{pool=\"clients\",env=\"test\"} 3"));
        assert!(output.contains("# TYPE handlepool_ttl_seconds gauge"));
    }

    #[test]
    fn registry_export_includes_per_name_counts() {
        let mut per_name_counts = HashMap::new();
        per_name_counts.insert("chat".to_string(), 2);

        let stats = RegistryStats {
            total_registered: 2,
            total_creations: 5,
            per_name_counts,
            auto_register: true,
        };

        let exported = stats.export();
        assert_eq!(exported.get("registered_chat").map(String::as_str), Some("2"));

        let output = MetricsExporter::export_registry_prometheus(&stats, "agents", None);
        assert!(output.contains("handlepool_creations_total{registry=\"agents\"} 5"));
        assert!(output.contains("name=\"chat\""));
    }
}
