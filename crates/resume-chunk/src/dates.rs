//! Resume date normalization.

use resume_core::ResumeDate;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Render a resume date for display.
///
/// `"Mon YYYY"` when year and month are present, the year alone when only the
/// year is present, otherwise an empty string. A month that is not a number
/// in 1..=12 renders as `"M/YYYY"`.
pub fn format_date(date: Option<&ResumeDate>) -> String {
    let Some(date) = date else {
        return String::new();
    };

    let year = date.year.filter(|y| *y != 0);
    let month = date.month.as_ref().filter(|m| !m.is_zero());

    match (year, month) {
        (Some(year), Some(month)) => {
            let name = month
                .as_number()
                .filter(|m| (1..=12).contains(m))
                .and_then(|m| MONTHS.get(m as usize - 1));
            match name {
                Some(name) => format!("{} {}", name, year),
                None => format!("{}/{}", month, year),
            }
        }
        (Some(year), None) => year.to_string(),
        _ => String::new(),
    }
}

/// Render an end date; an absent end date means the role is ongoing.
pub fn format_end_date(date: Option<&ResumeDate>) -> String {
    match date {
        Some(d) if !d.is_empty() => format_date(Some(d)),
        _ => "Present".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use resume_core::DatePart;

    fn date(year: Option<i32>, month: Option<i64>) -> ResumeDate {
        ResumeDate {
            year,
            month: month.map(DatePart::Number),
        }
    }

    #[test]
    fn test_year_and_month() {
        assert_eq!(format_date(Some(&date(Some(2020), Some(1)))), "Jan 2020");
        assert_eq!(format_date(Some(&date(Some(1999), Some(12)))), "Dec 1999");
    }

    #[test]
    fn test_year_only() {
        assert_eq!(format_date(Some(&date(Some(2018), None))), "2018");
    }

    #[test]
    fn test_month_only_or_missing() {
        assert_eq!(format_date(Some(&date(None, Some(4)))), "");
        assert_eq!(format_date(None), "");
    }

    #[test]
    fn test_invalid_month() {
        assert_eq!(format_date(Some(&date(Some(2020), Some(13)))), "13/2020");
        assert_eq!(format_date(Some(&date(Some(2020), Some(-3)))), "-3/2020");

        let text = ResumeDate {
            year: Some(2020),
            month: Some(DatePart::Text("Spring".to_string())),
        };
        assert_eq!(format_date(Some(&text)), "Spring/2020");
    }

    #[test]
    fn test_end_date() {
        assert_eq!(format_end_date(None), "Present");
        assert_eq!(format_end_date(Some(&ResumeDate::default())), "Present");
        assert_eq!(format_end_date(Some(&date(Some(2021), Some(6)))), "Jun 2021");
        // A month without a year is a recorded end date that cannot be shown.
        assert_eq!(format_end_date(Some(&date(None, Some(6)))), "");
    }
}
