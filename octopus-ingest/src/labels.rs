use std::collections::BTreeMap;

use octopus_client::ReadingType;

use crate::pipeline::MeterIds;

pub const METRIC_NAME_LABEL: &str = "__name__";
pub const SERIAL_LABEL: &str = "serial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Label pairs unique by name, kept sorted by name.
///
/// Remote-write receivers expect labels in this order, so iteration order is
/// also the order they go on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesLabels {
    labels: Vec<Label>,
}

impl SeriesLabels {
    /// Insert or replace the value for `name`.
    pub fn insert(&mut self, name: &str, value: &str) {
        match self.labels.binary_search_by(|l| l.name.as_str().cmp(name)) {
            Ok(idx) => self.labels[idx].value = value.to_string(),
            Err(idx) => self.labels.insert(
                idx,
                Label {
                    name: name.to_string(),
                    value: value.to_string(),
                },
            ),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.labels[idx].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }
}

struct LabelTemplate {
    metric_name: &'static str,
    meter_point_label: &'static str,
}

const ELECTRICITY: LabelTemplate = LabelTemplate {
    metric_name: "octopus_consumption_electricity_kwh",
    meter_point_label: "mpan",
};

const GAS: LabelTemplate = LabelTemplate {
    metric_name: "octopus_consumption_gas_kwh",
    meter_point_label: "mprn",
};

fn template(reading_type: ReadingType) -> &'static LabelTemplate {
    match reading_type {
        ReadingType::Electricity => &ELECTRICITY,
        ReadingType::Gas => &GAS,
    }
}

/// Derives the fixed label set of a reading stream.
///
/// Static extra labels are applied first; the metric name and meter
/// identifiers override any extra label of the same name. Identifiers with
/// an empty value are left out.
#[derive(Debug, Clone, Default)]
pub struct LabelBuilder {
    extra: BTreeMap<String, String>,
}

impl LabelBuilder {
    pub fn new(extra: BTreeMap<String, String>) -> Self {
        Self { extra }
    }

    pub fn build(&self, reading_type: ReadingType, meter: &MeterIds) -> SeriesLabels {
        let template = template(reading_type);
        let mut labels = SeriesLabels::default();

        for (name, value) in &self.extra {
            if !value.is_empty() {
                labels.insert(name, value);
            }
        }

        labels.insert(METRIC_NAME_LABEL, template.metric_name);
        if !meter.meter_point.is_empty() {
            labels.insert(template.meter_point_label, &meter.meter_point);
        }
        if !meter.serial.is_empty() {
            labels.insert(SERIAL_LABEL, &meter.serial);
        }

        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> MeterIds {
        MeterIds {
            meter_point: "1200000000000".to_string(),
            serial: "21L000".to_string(),
        }
    }

    fn names(labels: &SeriesLabels) -> Vec<&str> {
        labels.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn electricity_labels_are_sorted_with_name_first() {
        let labels = LabelBuilder::default().build(ReadingType::Electricity, &meter());

        assert_eq!(names(&labels), vec!["__name__", "mpan", "serial"]);
        assert_eq!(labels.get("__name__"), Some("octopus_consumption_electricity_kwh"));
        assert_eq!(labels.get("mpan"), Some("1200000000000"));
        assert_eq!(labels.get("serial"), Some("21L000"));
    }

    #[test]
    fn gas_uses_mprn_and_its_own_metric_name() {
        let labels = LabelBuilder::default().build(ReadingType::Gas, &meter());

        assert_eq!(labels.get("__name__"), Some("octopus_consumption_gas_kwh"));
        assert_eq!(labels.get("mprn"), Some("1200000000000"));
        assert_eq!(labels.get("mpan"), None);
    }

    #[test]
    fn build_is_deterministic() {
        let mut extra = BTreeMap::new();
        extra.insert("zone".to_string(), "home".to_string());
        extra.insert("job".to_string(), "octopus".to_string());
        let builder = LabelBuilder::new(extra);

        let a = builder.build(ReadingType::Electricity, &meter());
        let b = builder.build(ReadingType::Electricity, &meter());

        assert_eq!(a.iter().count(), 5);
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x == y));
        assert_eq!(names(&a), vec!["__name__", "job", "mpan", "serial", "zone"]);
    }

    #[test]
    fn template_labels_override_extras_and_empty_ids_are_skipped() {
        let mut extra = BTreeMap::new();
        extra.insert("__name__".to_string(), "bogus".to_string());
        extra.insert("serial".to_string(), "from-config".to_string());
        let builder = LabelBuilder::new(extra);

        let labels = builder.build(
            ReadingType::Gas,
            &MeterIds {
                meter_point: String::new(),
                serial: "G4A".to_string(),
            },
        );

        assert_eq!(labels.get("__name__"), Some("octopus_consumption_gas_kwh"));
        assert_eq!(labels.get("serial"), Some("G4A"));
        assert_eq!(labels.get("mprn"), None);
        assert_eq!(labels.iter().count(), 2);
    }
}
