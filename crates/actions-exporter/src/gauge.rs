//! Gauge families with snapshot semantics.

use prometheus_client::{
    collector::Collector as EncodeCollector,
    encoding::DescriptorEncoder,
    metrics::MetricType,
    registry::Unit,
};

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Label values of a single gauge in a family, in the order of [`GaugeDescriptor::labels`].
pub type LabelValues = Vec<String>;

/// Complete set of values of a gauge family.
pub type Snapshot = BTreeMap<LabelValues, f64>;

/// Static metadata of a gauge family.
#[derive(Debug, Clone)]
pub struct GaugeDescriptor {
    /// Family name without the unit suffix; see [`Self::exported_name()`] for the full name.
    pub name: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Optional unit; appended to the name on export.
    pub unit: Option<Unit>,
    /// Label names.
    pub labels: &'static [&'static str],
}

impl GaugeDescriptor {
    /// Returns the family name as exported, i.e. with the unit suffix if there is a unit.
    pub fn exported_name(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{}_{}", self.name, unit.as_str()),
            None => self.name.to_owned(),
        }
    }
}

#[derive(Debug)]
struct GaugeFamilyInner {
    descriptor: GaugeDescriptor,
    snapshot: RwLock<Snapshot>,
}

/// Family of gauges that is replaced as a whole on each update.
///
/// Readers (e.g., metrics exposition) always observe a snapshot published by a single
/// [`Self::publish()`] call; there are no partial updates. The family starts empty, so only
/// its metadata is exported until the first snapshot is published.
#[derive(Debug, Clone)]
pub struct GaugeFamily {
    inner: Arc<GaugeFamilyInner>,
}

impl GaugeFamily {
    /// Creates an empty family.
    pub fn new(descriptor: GaugeDescriptor) -> Self {
        Self {
            inner: Arc::new(GaugeFamilyInner {
                descriptor,
                snapshot: RwLock::default(),
            }),
        }
    }

    /// Returns metadata of this family.
    pub fn descriptor(&self) -> &GaugeDescriptor {
        &self.inner.descriptor
    }

    /// Atomically replaces the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        debug_assert!(
            snapshot
                .keys()
                .all(|values| values.len() == self.inner.descriptor.labels.len()),
            "label values do not match label names"
        );
        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the current value for the specified label values.
    pub fn get(&self, label_values: &[&str]) -> Option<f64> {
        let snapshot = self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.iter().find_map(|(values, &value)| {
            let matches = values.iter().map(String::as_str).eq(label_values.iter().copied());
            matches.then_some(value)
        })
    }
}

impl EncodeCollector for GaugeFamily {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> fmt::Result {
        let descriptor = &self.inner.descriptor;
        let snapshot = self.snapshot();
        // ^ Cloned so that the lock isn't held while encoding.

        let mut metric_encoder = encoder.encode_descriptor(
            descriptor.name,
            descriptor.help,
            descriptor.unit.as_ref(),
            MetricType::Gauge,
        )?;
        for (values, value) in &snapshot {
            let labels: Vec<(&str, &str)> = descriptor
                .labels
                .iter()
                .copied()
                .zip(values.iter().map(String::as_str))
                .collect();
            metric_encoder.encode_family(&labels)?.encode_gauge(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::{encoding::text, registry::Registry};

    use super::*;

    fn family() -> GaugeFamily {
        GaugeFamily::new(GaugeDescriptor {
            name: "test_runners",
            help: "Test runners",
            unit: None,
            labels: &["repository", "status"],
        })
    }

    fn snapshot<const N: usize>(entries: [(&str, f64); N]) -> Snapshot {
        entries
            .into_iter()
            .map(|(status, value)| (vec!["owner/repo".to_owned(), status.to_owned()], value))
            .collect()
    }

    fn encode(family: &GaugeFamily) -> String {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(family.clone()));
        let mut buffer = String::new();
        text::encode(&mut buffer, &registry).unwrap();
        buffer
    }

    #[test]
    fn publishing_replaces_snapshot() {
        let family = family();
        assert!(family.snapshot().is_empty());

        family.publish(snapshot([("online", 2.0), ("offline", 1.0)]));
        assert_eq!(family.get(&["owner/repo", "online"]), Some(2.0));

        family.publish(snapshot([("online", 3.0)]));
        assert_eq!(family.get(&["owner/repo", "online"]), Some(3.0));
        assert_eq!(family.get(&["owner/repo", "offline"]), None);
        assert_eq!(family.snapshot().len(), 1);
    }

    #[test]
    fn encoding_family() {
        let family = family();
        let buffer = encode(&family);
        assert!(buffer.contains("# TYPE test_runners gauge"), "{buffer}");
        assert!(!buffer.contains("test_runners{"), "{buffer}");

        family.publish(snapshot([("online", 2.0), ("offline", 0.0)]));
        let buffer = encode(&family);
        let lines: Vec<_> = buffer.lines().collect();
        assert!(lines.contains(&"# HELP test_runners Test runners"), "{lines:#?}");
        assert!(
            lines.contains(&r#"test_runners{repository="owner/repo",status="online"} 2.0"#),
            "{lines:#?}"
        );
        assert!(
            lines.contains(&r#"test_runners{repository="owner/repo",status="offline"} 0.0"#),
            "{lines:#?}"
        );
    }

    #[test]
    fn encoding_family_with_unit() {
        let family = GaugeFamily::new(GaugeDescriptor {
            name: "test_billable_time",
            help: "Billable time",
            unit: Some(Unit::Seconds),
            labels: &["name"],
        });
        family.publish([(vec!["CI".to_owned()], 1.5)].into());

        assert_eq!(family.descriptor().exported_name(), "test_billable_time_seconds");

        let buffer = encode(&family);
        let lines: Vec<_> = buffer.lines().collect();
        assert!(lines.contains(&"# UNIT test_billable_time_seconds seconds"), "{lines:#?}");
        assert!(
            lines.contains(&r#"test_billable_time_seconds{name="CI"} 1.5"#),
            "{lines:#?}"
        );
    }
}
