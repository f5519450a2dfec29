//! FDI tooth numbering and the per-line tooth chart.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Two-digit FDI tooth code: quadrant then position.
pub type ToothCode = u8;

/// Permanent dentition, quadrant by quadrant in chart order.
pub const PERMANENT_TEETH: [[ToothCode; 8]; 4] = [
    [18, 17, 16, 15, 14, 13, 12, 11],
    [21, 22, 23, 24, 25, 26, 27, 28],
    [31, 32, 33, 34, 35, 36, 37, 38],
    [48, 47, 46, 45, 44, 43, 42, 41],
];

/// Deciduous (milk) dentition, quadrant by quadrant in chart order.
pub const DECIDUOUS_TEETH: [[ToothCode; 5]; 4] = [
    [55, 54, 53, 52, 51],
    [61, 62, 63, 64, 65],
    [71, 72, 73, 74, 75],
    [85, 84, 83, 82, 81],
];

/// Which dentition the chart renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Permanent,
    Milk,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Permanent => "permanent",
            ChartType::Milk => "milk",
        }
    }

    /// All codes rendered for this chart type, in chart order.
    pub fn teeth(&self) -> Vec<ToothCode> {
        match self {
            ChartType::Permanent => PERMANENT_TEETH.iter().flatten().copied().collect(),
            ChartType::Milk => DECIDUOUS_TEETH.iter().flatten().copied().collect(),
        }
    }
}

/// True when `code` belongs to either FDI set.
pub fn is_valid_tooth(code: ToothCode) -> bool {
    let quadrant = code / 10;
    let position = code % 10;
    match quadrant {
        1..=4 => (1..=8).contains(&position),
        5..=8 => (1..=5).contains(&position),
        _ => false,
    }
}

/// Set of teeth selected on one treatment line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToothSelection(BTreeSet<ToothCode>);

impl ToothSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `code`. Returns whether the tooth is now selected.
    pub fn toggle(&mut self, code: ToothCode) -> bool {
        if self.0.remove(&code) {
            false
        } else {
            self.0.insert(code);
            true
        }
    }

    pub fn contains(&self, code: ToothCode) -> bool {
        self.0.contains(&code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = ToothCode> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<ToothCode> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<ToothCode> for ToothSelection {
    fn from_iter<I: IntoIterator<Item = ToothCode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Which treatment line, if any, shows its tooth chart.
///
/// The chart type is remembered across open/close so switching lines keeps
/// the dentition the user last picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToothChart {
    open_index: Option<usize>,
    chart_type: ChartType,
}

impl ToothChart {
    pub fn open_index(&self) -> Option<usize> {
        self.open_index
    }

    pub fn chart_type(&self) -> ChartType {
        self.chart_type
    }

    pub fn is_open_for(&self, index: usize) -> bool {
        self.open_index == Some(index)
    }

    /// Open the chart for `index`, or close it if it is already showing it.
    pub fn toggle(&mut self, index: usize) {
        self.open_index = if self.is_open_for(index) {
            None
        } else {
            Some(index)
        };
    }

    pub fn set_chart_type(&mut self, chart_type: ChartType) {
        self.chart_type = chart_type;
    }

    pub fn close(&mut self) {
        self.open_index = None;
    }

    /// Keep the open index pointing at the same line after `removed` is
    /// taken out of the item list.
    pub fn on_item_removed(&mut self, removed: usize) {
        self.open_index = match self.open_index {
            Some(open) if open == removed => None,
            Some(open) if open > removed => Some(open - 1),
            other => other,
        };
    }
}
