use chrono::NaiveDate;
use std::path::Path;

/// Derive the calendar date of a journal file from its path.
///
/// The filename stem is tried first (`YYYY-MM-DD`, underscores accepted as
/// separators). Failing that, the enclosing `<year>/<month>/` directories
/// supply year and month (numeric or English month name) and the first stem
/// token supplies the day. Returns `None` when neither form applies or the
/// date is not a valid calendar date.
pub fn file_date(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let normalized = stem.replace('_', "-");
    let parts: Vec<&str> = normalized.split('-').collect();

    let year = parts.first().and_then(|s| s.parse::<i32>().ok());
    let month = parts.get(1).and_then(|s| s.parse::<u32>().ok());
    let day = parts.get(2).and_then(|s| s.parse::<u32>().ok());
    if let (Some(year), Some(month), Some(day)) = (year, month, day) {
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let month_dir = path.parent()?.file_name()?.to_str()?;
    let year_dir = path.parent()?.parent()?.file_name()?.to_str()?;
    let year = year_dir.parse::<i32>().ok()?;
    let month = parse_month(month_dir)?;
    let day = parts.first().and_then(|s| s.parse::<u32>().ok())?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_month(s: &str) -> Option<u32> {
    if let Ok(n) = s.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let n = match s.to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_from_filename() {
        assert_eq!(
            file_date(&PathBuf::from("notes/2025-08-06.md")),
            Some(date(2025, 8, 6))
        );
    }

    #[test]
    fn test_date_from_filename_with_underscores() {
        assert_eq!(
            file_date(&PathBuf::from("2024_01_31.md")),
            Some(date(2024, 1, 31))
        );
    }

    #[test]
    fn test_invalid_calendar_date_is_none() {
        assert_eq!(file_date(&PathBuf::from("2025-13-40.md")), None);
    }

    #[test]
    fn test_date_from_numeric_directories() {
        assert_eq!(
            file_date(&PathBuf::from("journal/2025/8/06.md")),
            Some(date(2025, 8, 6))
        );
    }

    #[test]
    fn test_date_from_month_name_directory() {
        assert_eq!(
            file_date(&PathBuf::from("journal/2025/August/06.md")),
            Some(date(2025, 8, 6))
        );
    }

    #[test]
    fn test_undateable_path_is_none() {
        assert_eq!(file_date(&PathBuf::from("journal/random-notes.md")), None);
        assert_eq!(file_date(&PathBuf::from("scratch.md")), None);
    }
}
