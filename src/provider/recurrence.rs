//! Subset translation between RRULE strings and Graph recurrence patterns.
//!
//! Canonical recurrence is an opaque RRULE-style string; Microsoft Graph
//! wants a structured `patternedRecurrence`. The subset covers FREQ,
//! INTERVAL, BYDAY, BYMONTHDAY and BYMONTH with a no-end range, which is
//! what the two providers can represent in common. Rules outside the
//! subset stay on the side that owns them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecurrence {
    pub pattern: GraphPattern,
    pub range: GraphRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRange {
    #[serde(rename = "type")]
    pub kind: String,
}

impl GraphRange {
    fn no_end() -> Self {
        Self {
            kind: "noEnd".to_string(),
        }
    }
}

const DAY_CODES: [(&str, &str); 7] = [
    ("MO", "monday"),
    ("TU", "tuesday"),
    ("WE", "wednesday"),
    ("TH", "thursday"),
    ("FR", "friday"),
    ("SA", "saturday"),
    ("SU", "sunday"),
];

fn day_code_to_graph(code: &str) -> Option<&'static str> {
    DAY_CODES
        .iter()
        .find(|(rr, _)| *rr == code)
        .map(|(_, graph)| *graph)
}

fn graph_day_to_code(day: &str) -> Option<&'static str> {
    DAY_CODES
        .iter()
        .find(|(_, graph)| graph.eq_ignore_ascii_case(day))
        .map(|(rr, _)| *rr)
}

/// Parse an RRULE string into a Graph recurrence, or `None` when the rule
/// falls outside the supported subset.
pub fn rrule_to_graph(rrule: &str) -> Option<GraphRecurrence> {
    let body = rrule.trim().strip_prefix("RRULE:").unwrap_or(rrule.trim());

    let mut freq = None;
    let mut interval = 1u32;
    let mut by_day: Vec<String> = Vec::new();
    let mut by_month_day = None;
    let mut by_month = None;

    for part in body.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=')?;
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(value.to_ascii_uppercase()),
            "INTERVAL" => interval = value.parse().ok()?,
            "BYDAY" => {
                for code in value.split(',') {
                    by_day.push(day_code_to_graph(&code.to_ascii_uppercase())?.to_string());
                }
            }
            "BYMONTHDAY" => by_month_day = Some(value.parse().ok()?),
            "BYMONTH" => by_month = Some(value.parse().ok()?),
            // COUNT/UNTIL and positional BYDAY are outside the subset.
            _ => return None,
        }
    }

    let kind = match freq?.as_str() {
        "DAILY" => "daily",
        "WEEKLY" => "weekly",
        "MONTHLY" => "absoluteMonthly",
        "YEARLY" => "absoluteYearly",
        _ => return None,
    };

    Some(GraphRecurrence {
        pattern: GraphPattern {
            kind: kind.to_string(),
            interval,
            days_of_week: by_day,
            day_of_month: by_month_day,
            month: by_month,
        },
        range: GraphRange::no_end(),
    })
}

/// Render a Graph recurrence back into an RRULE string.
pub fn graph_to_rrule(recurrence: &GraphRecurrence) -> Option<String> {
    let freq = match recurrence.pattern.kind.as_str() {
        "daily" => "DAILY",
        "weekly" => "WEEKLY",
        "absoluteMonthly" => "MONTHLY",
        "absoluteYearly" => "YEARLY",
        _ => return None,
    };

    let mut rule = format!("RRULE:FREQ={freq}");
    if recurrence.pattern.interval > 1 {
        rule.push_str(&format!(";INTERVAL={}", recurrence.pattern.interval));
    }
    if !recurrence.pattern.days_of_week.is_empty() {
        let codes: Option<Vec<&str>> = recurrence
            .pattern
            .days_of_week
            .iter()
            .map(|d| graph_day_to_code(d))
            .collect();
        rule.push_str(&format!(";BYDAY={}", codes?.join(",")));
    }
    if let Some(day) = recurrence.pattern.day_of_month {
        rule.push_str(&format!(";BYMONTHDAY={day}"));
    }
    if let Some(month) = recurrence.pattern.month {
        rule.push_str(&format!(";BYMONTH={month}"));
    }
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_with_days_round_trips() {
        let graph = rrule_to_graph("RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE").unwrap();
        assert_eq!(graph.pattern.kind, "weekly");
        assert_eq!(graph.pattern.interval, 2);
        assert_eq!(graph.pattern.days_of_week, vec!["monday", "wednesday"]);
        assert_eq!(graph.range.kind, "noEnd");

        assert_eq!(
            graph_to_rrule(&graph).unwrap(),
            "RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE"
        );
    }

    #[test]
    fn monthly_by_day_of_month() {
        let graph = rrule_to_graph("FREQ=MONTHLY;BYMONTHDAY=15").unwrap();
        assert_eq!(graph.pattern.kind, "absoluteMonthly");
        assert_eq!(graph.pattern.day_of_month, Some(15));
        assert_eq!(
            graph_to_rrule(&graph).unwrap(),
            "RRULE:FREQ=MONTHLY;BYMONTHDAY=15"
        );
    }

    #[test]
    fn unsupported_parts_translate_to_none() {
        assert!(rrule_to_graph("RRULE:FREQ=WEEKLY;COUNT=10").is_none());
        assert!(rrule_to_graph("RRULE:FREQ=HOURLY").is_none());
        assert!(rrule_to_graph("not a rule").is_none());
    }

    #[test]
    fn relative_graph_patterns_translate_to_none() {
        let graph = GraphRecurrence {
            pattern: GraphPattern {
                kind: "relativeMonthly".to_string(),
                interval: 1,
                days_of_week: vec!["friday".to_string()],
                day_of_month: None,
                month: None,
            },
            range: GraphRange::no_end(),
        };
        assert!(graph_to_rrule(&graph).is_none());
    }
}
