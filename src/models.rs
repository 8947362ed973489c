use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

pub const WILDCARD: &str = "All";

pub const METADATA_HEADERS: [&str; 5] = [
    "Student",
    "Grade",
    "Total Days",
    "Start Milestone",
    "Current Milestone",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub virtual_id: String,
    pub student: String,
    pub district: String,
    pub mandal: String,
    pub school: String,
    pub grade: String,
    pub date: NaiveDate,
    pub start_milestone: String,
    pub current_milestone: String,
    pub total_days: Option<f64>,
    pub movement: String,
}

// Records keep filtered-set order; the first one supplies the sort key and
// row metadata.
#[derive(Debug, Clone)]
pub struct StudentGroup<'a> {
    virtual_id: &'a str,
    records: Vec<&'a Observation>,
}

impl<'a> StudentGroup<'a> {
    pub fn new(first: &'a Observation) -> Self {
        Self {
            virtual_id: &first.virtual_id,
            records: vec![first],
        }
    }

    pub fn push(&mut self, record: &'a Observation) {
        debug_assert_eq!(record.virtual_id, self.virtual_id);
        self.records.push(record);
    }

    pub fn virtual_id(&self) -> &'a str {
        self.virtual_id
    }

    pub fn records(&self) -> &[&'a Observation] {
        &self.records
    }

    pub fn representative(&self) -> &'a Observation {
        self.records[0]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    #[default]
    All,
    Exact(String),
}

impl Selector {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Exact(expected) => expected == value,
        }
    }
}

impl FromStr for Selector {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == WILDCARD {
            Ok(Selector::All)
        } else {
            Ok(Selector::Exact(value.to_string()))
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str(WILDCARD),
            Selector::Exact(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selectors {
    pub district: Selector,
    pub mandal: Selector,
    pub school: Selector,
}

impl Selectors {
    pub fn matches(&self, observation: &Observation) -> bool {
        self.district.matches(&observation.district)
            && self.mandal.matches(&observation.mandal)
            && self.school.matches(&observation.school)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoricalField {
    District,
    Mandal,
    School,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 3] = [
        CategoricalField::District,
        CategoricalField::Mandal,
        CategoricalField::School,
    ];

    pub fn value<'a>(&self, observation: &'a Observation) -> &'a str {
        match self {
            CategoricalField::District => &observation.district,
            CategoricalField::Mandal => &observation.mandal,
            CategoricalField::School => &observation.school,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CategoricalField::District => "District",
            CategoricalField::Mandal => "Mandal",
            CategoricalField::School => "School",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortField {
    #[default]
    Student,
    Grade,
    TotalDays,
    StartMilestone,
    CurrentMilestone,
}

impl SortField {
    pub fn label(&self) -> &'static str {
        match self {
            SortField::Student => "Student",
            SortField::Grade => "Grade",
            SortField::TotalDays => "Total Days",
            SortField::StartMilestone => "Start Milestone",
            SortField::CurrentMilestone => "Current Milestone",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    #[default]
    #[value(name = "asc")]
    Ascending,
    #[value(name = "desc")]
    Descending,
}

impl SortOrder {
    pub fn label(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellCategory {
    Transition,
    NoChange,
}

impl CellCategory {
    pub fn css_class(&self) -> &'static str {
        match self {
            CellCategory::Transition => "transition",
            CellCategory::NoChange => "no-change",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    // No observation for this student on this date.
    Empty,
    Observed { category: CellCategory, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub virtual_id: String,
    pub student: String,
    pub grade: String,
    pub total_days: Option<f64>,
    pub start_milestone: String,
    pub current_milestone: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixView {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<MatrixRow>,
}

impl MatrixView {
    pub fn header_labels(&self) -> Vec<String> {
        METADATA_HEADERS
            .iter()
            .map(|label| label.to_string())
            .chain(self.dates.iter().map(|date| date_label(*date)))
            .collect()
    }
}

pub fn date_label(date: NaiveDate) -> String {
    date.format("%b %d").to_string()
}

pub fn format_total_days(total_days: Option<f64>) -> String {
    total_days.map(|days| days.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixSummary {
    pub students: usize,
    pub dates: usize,
    pub transitions: usize,
    pub no_change: usize,
    pub empty: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_parses_to_all() {
        assert_eq!("All".parse::<Selector>().unwrap(), Selector::All);
        assert_eq!(
            "Guntur".parse::<Selector>().unwrap(),
            Selector::Exact("Guntur".to_string())
        );
        assert!(Selector::All.matches(""));
        assert!(!Selector::Exact("Guntur".to_string()).matches("guntur"));
    }

    #[test]
    fn header_lists_metadata_then_dates() {
        let view = MatrixView {
            dates: vec![
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
            ],
            rows: Vec::new(),
        };
        assert_eq!(
            view.header_labels(),
            vec![
                "Student",
                "Grade",
                "Total Days",
                "Start Milestone",
                "Current Milestone",
                "Jan 03",
                "Feb 14"
            ]
        );
    }

    #[test]
    fn total_days_formats_without_trailing_zero() {
        assert_eq!(format_total_days(Some(12.0)), "12");
        assert_eq!(format_total_days(Some(4.5)), "4.5");
        assert_eq!(format_total_days(None), "");
    }
}
