use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::milestone;
use crate::models::Observation;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("record {index} (VirtualId {virtual_id:?}) has no Date")]
    MissingDate { index: usize, virtual_id: String },
    #[error("record {index} (VirtualId {virtual_id:?}) has unparseable Date {value:?}")]
    InvalidDate {
        index: usize,
        virtual_id: String,
        value: String,
    },
    #[error("unsupported dataset format for {0}; expected a .json or .csv file")]
    UnsupportedFormat(String),
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    #[serde(rename = "VirtualId", default, deserialize_with = "lenient_string")]
    virtual_id: String,
    #[serde(rename = "Student", default, deserialize_with = "lenient_string")]
    student: String,
    #[serde(rename = "District", default, deserialize_with = "lenient_string")]
    district: String,
    #[serde(rename = "Mandal", default, deserialize_with = "lenient_string")]
    mandal: String,
    #[serde(rename = "School", default, deserialize_with = "lenient_string")]
    school: String,
    #[serde(rename = "Grade", default, deserialize_with = "lenient_string")]
    grade: String,
    #[serde(rename = "Date", default, deserialize_with = "lenient_string")]
    date: String,
    #[serde(rename = "Start_Milestone", default, deserialize_with = "lenient_string")]
    start_milestone: String,
    #[serde(rename = "Current_Milestone", default, deserialize_with = "lenient_string")]
    current_milestone: String,
    #[serde(rename = "Total_Days", default, deserialize_with = "lenient_number")]
    total_days: Option<f64>,
    #[serde(rename = "Movement", default, deserialize_with = "lenient_string")]
    movement: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Flag(value) => value.to_string(),
            Scalar::Integer(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Text(value) => value,
        }
    }

    fn into_number(self) -> Option<f64> {
        match self {
            Scalar::Integer(value) => Some(value as f64),
            Scalar::Float(value) => Some(value),
            Scalar::Text(value) => parse_days(&value),
            Scalar::Flag(_) => None,
        }
    }
}

// "NaN" and "inf" parse as f64 but are not day counts.
fn parse_days(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|days| days.is_finite())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(Scalar::into_text)
        .unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.and_then(Scalar::into_number))
}

// Accepts `YYYY-MM-DD`, RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS` timestamps.
// Time of day is dropped.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(|dt| dt.date())
        })
}

fn into_observations(raw: Vec<RawObservation>) -> Result<Vec<Observation>, LoadError> {
    raw.into_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.date.trim().is_empty() {
                return Err(LoadError::MissingDate {
                    index,
                    virtual_id: row.virtual_id,
                });
            }
            let date = parse_date(&row.date).ok_or_else(|| LoadError::InvalidDate {
                index,
                virtual_id: row.virtual_id.clone(),
                value: row.date.clone(),
            })?;

            Ok(Observation {
                virtual_id: row.virtual_id,
                student: row.student,
                district: row.district,
                mandal: row.mandal,
                school: row.school,
                grade: row.grade,
                date,
                start_milestone: row.start_milestone,
                current_milestone: row.current_milestone,
                total_days: row.total_days,
                movement: row.movement,
            })
        })
        .collect()
}

pub fn read_json<R: Read>(reader: R) -> anyhow::Result<Vec<Observation>> {
    let raw: Vec<RawObservation> =
        serde_json::from_reader(reader).context("dataset is not a JSON array of records")?;
    Ok(into_observations(raw)?)
}

pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Observation>> {
    // Cells are kept verbatim so ids like "007" are not read as numbers.
    #[derive(Deserialize)]
    struct CsvRow {
        #[serde(rename = "VirtualId", default)]
        virtual_id: String,
        #[serde(rename = "Student", default)]
        student: String,
        #[serde(rename = "District", default)]
        district: String,
        #[serde(rename = "Mandal", default)]
        mandal: String,
        #[serde(rename = "School", default)]
        school: String,
        #[serde(rename = "Grade", default)]
        grade: String,
        #[serde(rename = "Date", default)]
        date: String,
        #[serde(rename = "Start_Milestone", default)]
        start_milestone: String,
        #[serde(rename = "Current_Milestone", default)]
        current_milestone: String,
        #[serde(rename = "Total_Days", default)]
        total_days: Option<String>,
        #[serde(rename = "Movement", default)]
        movement: String,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut raw = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV record {index}"))?;
        raw.push(RawObservation {
            virtual_id: row.virtual_id,
            student: row.student,
            district: row.district,
            mandal: row.mandal,
            school: row.school,
            grade: row.grade,
            date: row.date,
            start_milestone: row.start_milestone,
            current_milestone: row.current_milestone,
            total_days: row.total_days.as_deref().and_then(parse_days),
            movement: row.movement,
        });
    }

    Ok(into_observations(raw)?)
}

pub fn load_dataset(path: &Path) -> anyhow::Result<Vec<Observation>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let open = || {
        File::open(path)
            .map(BufReader::new)
            .with_context(|| format!("failed to open {}", path.display()))
    };

    let observations = match extension.as_deref() {
        Some("json") => read_json(open()?),
        Some("csv") => read_csv(open()?),
        _ => return Err(LoadError::UnsupportedFormat(path.display().to_string()).into()),
    }
    .with_context(|| format!("failed to load {}", path.display()))?;

    let audit = audit(&observations);
    for code in &audit.unknown_milestones {
        warn!(code = %code, "milestone code is not on the scale; it will sort first");
    }
    if audit.duplicate_keys > 0 {
        warn!(
            duplicates = audit.duplicate_keys,
            "repeated (VirtualId, Date) pairs; the first record per pair is shown"
        );
    }
    info!(
        records = observations.len(),
        path = %path.display(),
        "loaded dataset"
    );

    Ok(observations)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DatasetAudit {
    pub unknown_milestones: BTreeSet<String>,
    pub duplicate_keys: usize,
}

pub fn audit(observations: &[Observation]) -> DatasetAudit {
    let mut result = DatasetAudit::default();
    let mut seen: HashSet<(&str, NaiveDate)> = HashSet::new();

    for observation in observations {
        for code in [&observation.start_milestone, &observation.current_milestone] {
            if !milestone::is_known(code) {
                result.unknown_milestones.insert(code.clone());
            }
        }
        if !seen.insert((observation.virtual_id.as_str(), observation.date)) {
            result.duplicate_keys += 1;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_JSON: &str = r#"[
        {
            "District": "Guntur", "Mandal": "Tenali", "School": "ZPHS Tenali",
            "Student": "Avery", "Grade": 6, "VirtualId": "V001",
            "Date": "2024-01-03", "Start_Milestone": "B", "Current_Milestone": "F1_L2",
            "Total_Days": 14, "Movement": "F1_L1→F1_L2"
        },
        {
            "District": "Guntur", "Mandal": "Tenali", "School": "ZPHS Tenali",
            "Student": "Avery", "Grade": "6", "VirtualId": "V001",
            "Date": "2024-01-01T09:30:00.000Z", "Start_Milestone": "B",
            "Current_Milestone": "F1_L1", "Total_Days": "12", "Movement": null
        },
        {
            "District": "Krishna", "Student": "Jules", "VirtualId": "V002",
            "Date": "2024-01-02T00:00:00", "Start_Milestone": "F2_L1",
            "Current_Milestone": "x9", "Total_Days": 3.5
        }
    ]"#;

    #[test]
    fn parses_supported_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(parse_date("2024-01-03"), Some(expected));
        assert_eq!(parse_date(" 2024-01-03 "), Some(expected));
        assert_eq!(parse_date("2024-01-03T18:45:00Z"), Some(expected));
        assert_eq!(parse_date("2024-01-03T18:45:00+05:30"), Some(expected));
        assert_eq!(parse_date("2024-01-03T18:45:00.250"), Some(expected));
        assert_eq!(parse_date("2024-01-03 07:00:00"), Some(expected));
        assert_eq!(parse_date("1704240000000"), None);
        assert_eq!(parse_date("20240103"), None);
        assert_eq!(parse_date("03/01/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn reads_json_with_lenient_fields() {
        let observations = read_json(SAMPLE_JSON.as_bytes()).unwrap();
        assert_eq!(observations.len(), 3);

        let first = &observations[0];
        assert_eq!(first.grade, "6");
        assert_eq!(first.total_days, Some(14.0));
        assert_eq!(first.movement, "F1_L1→F1_L2");

        let second = &observations[1];
        assert_eq!(second.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(second.total_days, Some(12.0));
        assert_eq!(second.movement, "");

        let third = &observations[2];
        assert_eq!(third.mandal, "");
        assert_eq!(third.school, "");
        assert_eq!(third.grade, "");
        assert_eq!(third.total_days, Some(3.5));
    }

    #[test]
    fn unparseable_date_is_fatal() {
        let json = r#"[
            {"VirtualId": "V1", "Date": "2024-01-01"},
            {"VirtualId": "V2", "Date": "someday"}
        ]"#;
        let err = read_json(json.as_bytes()).unwrap_err();
        match err.downcast_ref::<LoadError>() {
            Some(LoadError::InvalidDate {
                index, virtual_id, ..
            }) => {
                assert_eq!(*index, 1);
                assert_eq!(virtual_id, "V2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bare_numbers_are_not_dates() {
        for value in [r#""20240103""#, r#""2024""#, "45292"] {
            let json = format!(r#"[{{"VirtualId": "V1", "Date": {value}}}]"#);
            let err = read_json(json.as_bytes()).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<LoadError>(),
                    Some(LoadError::InvalidDate { index: 0, .. })
                ),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn non_finite_day_counts_load_as_missing() {
        let json = r#"[
            {"VirtualId": "V1", "Date": "2024-01-03", "Total_Days": "NaN"},
            {"VirtualId": "V2", "Date": "2024-01-03", "Total_Days": " infinity "},
            {"VirtualId": "V3", "Date": "2024-01-03", "Total_Days": "-inf"},
            {"VirtualId": "V4", "Date": "2024-01-03", "Total_Days": " 9 "}
        ]"#;
        let observations = read_json(json.as_bytes()).unwrap();
        let days: Vec<Option<f64>> = observations.iter().map(|o| o.total_days).collect();
        assert_eq!(days, vec![None, None, None, Some(9.0)]);
    }

    #[test]
    fn missing_date_is_fatal() {
        let json = r#"[{"VirtualId": "V1", "Movement": "B"}]"#;
        let err = read_json(json.as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::MissingDate { index: 0, .. })
        ));
    }

    #[test]
    fn loads_csv_export_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        let rows = [
            "District,Mandal,School,Student,Grade,VirtualId,Date,\
             Start_Milestone,Current_Milestone,Total_Days,Movement",
            "Guntur,Tenali,ZPHS Tenali,Avery,6,V001,2024-01-03,B,F1_L2,14,F1_L1→F1_L2",
            "Guntur,Tenali,ZPHS Tenali,Kiara,07,007,2024-01-03,F1_L1,F1_L1,,",
            "Guntur,Tenali,ZPHS Tenali,Jules,6,V004,2024-01-03,B,B,inf,",
        ];
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file.flush().unwrap();

        let observations = load_dataset(file.path()).unwrap();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].total_days, Some(14.0));
        assert_eq!(observations[1].total_days, None);
        assert_eq!(observations[1].movement, "");
        assert_eq!(observations[1].grade, "07");
        assert_eq!(observations[1].virtual_id, "007");
        assert_eq!(observations[2].total_days, None);
    }

    #[test]
    fn loads_json_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(SAMPLE_JSON.as_bytes()).unwrap();
        file.flush().unwrap();

        let observations = load_dataset(file.path()).unwrap();
        assert_eq!(observations.len(), 3);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let err = load_dataset(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn audit_flags_unknown_codes_and_duplicates() {
        let mut observations = read_json(SAMPLE_JSON.as_bytes()).unwrap();
        observations.push(observations[0].clone());

        let audit = audit(&observations);
        assert_eq!(
            audit.unknown_milestones,
            BTreeSet::from(["x9".to_string()])
        );
        assert_eq!(audit.duplicate_keys, 1);
    }
}
