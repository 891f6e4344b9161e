use crate::sources::edgar::{form_description, is_event_form, item_description, parse_event_codes};
use crate::types::{ClassifiedFilings, Item, RoutineFilingRow};

/// Event codes that make an event filing worth narrative treatment.
pub const NOTABLE_EVENT_CODES: &[&str] = &[
    "1.01", "1.02", "1.03", "2.01", "2.02", "2.03", "2.04", "2.05", "2.06", "3.01", "3.02", "3.03",
    "4.01", "4.02", "5.01", "5.02", "5.03",
];

pub fn is_notable(item: &Item) -> bool {
    match item.filing() {
        Some(meta) if is_event_form(&meta.form_type) => parse_event_codes(&meta.event_codes)
            .iter()
            .any(|code| NOTABLE_EVENT_CODES.contains(code)),
        _ => false,
    }
}

/// Partitions filings into notable and routine, preserving order within each.
pub fn classify_filings(filings: Vec<Item>) -> ClassifiedFilings {
    let (notable, routine) = filings.into_iter().partition(is_notable);
    ClassifiedFilings { notable, routine }
}

/// Compact listing row for a filing that gets no narrative treatment.
pub fn routine_row(item: &Item) -> Option<RoutineFilingRow> {
    let meta = item.filing()?;

    let short_detail = if is_event_form(&meta.form_type) {
        let labels: Vec<&str> = parse_event_codes(&meta.event_codes)
            .into_iter()
            .filter(|code| *code != "9.01")
            .filter_map(item_description)
            .collect();
        if labels.is_empty() {
            "Exhibits only".to_string()
        } else {
            labels.join("; ")
        }
    } else {
        form_description(&meta.form_type)
            .unwrap_or(meta.form_type.as_str())
            .to_string()
    };

    Some(RoutineFilingRow {
        company: meta.company.clone(),
        form_type: meta.form_type.clone(),
        date: meta.filed_on,
        url: item.url.clone(),
        short_detail,
    })
}

pub fn routine_rows(items: &[Item]) -> Vec<RoutineFilingRow> {
    items.iter().filter_map(routine_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FilingMeta, OriginKind};
    use chrono::NaiveDate;

    fn filing(form: &str, codes: &str) -> Item {
        let meta = FilingMeta {
            company: "Arcellx".to_string(),
            ticker: "ACLX".to_string(),
            form_type: form.to_string(),
            filed_on: NaiveDate::from_ymd_opt(2025, 3, 18).unwrap(),
            event_codes: codes.to_string(),
        };
        Item::new(format!("https://www.sec.gov/{}/{}", form, codes), "t", "SEC", OriginKind::Filing(meta))
    }

    #[test]
    fn disclosure_codes_decide_event_filings() {
        let classified = classify_filings(vec![filing("8-K", "7.01,9.01"), filing("8-K", "1.01"), filing("10-K", "")]);

        assert_eq!(classified.notable.len(), 1);
        assert_eq!(classified.notable[0].filing().unwrap().event_codes, "1.01");
        assert_eq!(classified.routine.len(), 2);
        assert_eq!(classified.routine[0].filing().unwrap().event_codes, "7.01,9.01");
    }

    #[test]
    fn amended_event_filings_are_inspected_too() {
        assert!(is_notable(&filing("8-K/A", "5.02")));
        assert!(!is_notable(&filing("10-Q", "1.01")));
    }

    #[test]
    fn routine_rows_describe_the_filing() {
        let row = routine_row(&filing("8-K", "7.01,9.01")).unwrap();
        assert_eq!(row.short_detail, "Regulation FD Disclosure");
        assert_eq!(row.company, "Arcellx");

        let row = routine_row(&filing("10-Q", "")).unwrap();
        assert_eq!(row.short_detail, "Quarterly financial report");

        let plain = Item::new("https://x/1", "Not a filing", "X", OriginKind::FeedEntry);
        assert!(routine_row(&plain).is_none());
    }
}
