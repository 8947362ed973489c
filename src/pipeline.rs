use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use crate::milestone;
use crate::models::{
    CategoricalField, Cell, CellCategory, MatrixRow, MatrixSummary, MatrixView, Observation,
    Selectors, SortField, SortOrder, SortSpec, StudentGroup, WILDCARD,
};

// Substring of `Movement` that marks a milestone transition.
pub const TRANSITION_MARKER: &str = "→";

pub fn render(data: &[Observation], selectors: &Selectors, sort: SortSpec) -> MatrixView {
    let filtered = filter(data, selectors);
    let mut groups = group_by_student(&filtered);
    sort_groups(&mut groups, sort);
    let dates = date_axis(&filtered);
    let rows = project(&groups, &dates);

    debug!(
        observations = filtered.len(),
        students = rows.len(),
        dates = dates.len(),
        "rendered matrix"
    );

    MatrixView { dates, rows }
}

pub fn filter<'a>(data: &'a [Observation], selectors: &Selectors) -> Vec<&'a Observation> {
    let filtered: Vec<&Observation> = data
        .iter()
        .filter(|observation| selectors.matches(observation))
        .collect();
    debug!(total = data.len(), kept = filtered.len(), "filtered observations");
    filtered
}

pub fn group_by_student<'a>(filtered: &[&'a Observation]) -> Vec<StudentGroup<'a>> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<StudentGroup<'a>> = Vec::new();

    for &observation in filtered {
        match positions.get(observation.virtual_id.as_str()) {
            Some(&index) => groups[index].push(observation),
            None => {
                positions.insert(&observation.virtual_id, groups.len());
                groups.push(StudentGroup::new(observation));
            }
        }
    }

    groups
}

pub fn sort_groups(groups: &mut [StudentGroup<'_>], spec: SortSpec) {
    groups.sort_by(|a, b| {
        let primary = compare_field(a.representative(), b.representative(), spec.field);
        let primary = match spec.order {
            SortOrder::Ascending => primary,
            SortOrder::Descending => primary.reverse(),
        };
        primary.then_with(|| a.virtual_id().cmp(b.virtual_id()))
    });
}

fn compare_field(a: &Observation, b: &Observation, field: SortField) -> Ordering {
    match field {
        SortField::Student => a.student.cmp(&b.student),
        SortField::Grade => a.grade.cmp(&b.grade),
        SortField::TotalDays => compare_days(a.total_days, b.total_days),
        SortField::StartMilestone => {
            milestone::ordinal(&a.start_milestone).cmp(&milestone::ordinal(&b.start_milestone))
        }
        SortField::CurrentMilestone => milestone::ordinal(&a.current_milestone)
            .cmp(&milestone::ordinal(&b.current_milestone)),
    }
}

// Missing day counts order before any recorded value.
fn compare_days(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

pub fn date_axis(filtered: &[&Observation]) -> Vec<NaiveDate> {
    filtered
        .iter()
        .map(|observation| observation.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn classify(movement: &str) -> CellCategory {
    if movement.contains(TRANSITION_MARKER) {
        CellCategory::Transition
    } else {
        CellCategory::NoChange
    }
}

pub fn project(groups: &[StudentGroup<'_>], dates: &[NaiveDate]) -> Vec<MatrixRow> {
    groups
        .iter()
        .map(|group| {
            let mut by_date: BTreeMap<NaiveDate, &Observation> = BTreeMap::new();
            for &record in group.records() {
                by_date.entry(record.date).or_insert(record);
            }

            let cells = dates
                .iter()
                .map(|date| match by_date.get(date) {
                    Some(record) => Cell::Observed {
                        category: classify(&record.movement),
                        text: record.movement.clone(),
                    },
                    None => Cell::Empty,
                })
                .collect();

            let meta = group.representative();
            MatrixRow {
                virtual_id: meta.virtual_id.clone(),
                student: meta.student.clone(),
                grade: meta.grade.clone(),
                total_days: meta.total_days,
                start_milestone: meta.start_milestone.clone(),
                current_milestone: meta.current_milestone.clone(),
                cells,
            }
        })
        .collect()
}

pub fn distinct_values(data: &[Observation], field: CategoricalField) -> Vec<String> {
    let values: BTreeSet<&str> = data.iter().map(|observation| field.value(observation)).collect();
    std::iter::once(WILDCARD)
        .chain(values)
        .map(str::to_string)
        .collect()
}

pub fn summarize(view: &MatrixView) -> MatrixSummary {
    let mut summary = MatrixSummary {
        students: view.rows.len(),
        dates: view.dates.len(),
        ..MatrixSummary::default()
    };

    for cell in view.rows.iter().flat_map(|row| row.cells.iter()) {
        match cell {
            Cell::Empty => summary.empty += 1,
            Cell::Observed {
                category: CellCategory::Transition,
                ..
            } => summary.transitions += 1,
            Cell::Observed {
                category: CellCategory::NoChange,
                ..
            } => summary.no_change += 1,
        }
    }

    summary
}
