//! Effective file dates and the date bucket folders derived from them.
//!
//! Images can carry their capture time in EXIF (`DateTimeOriginal`, written as
//! `YYYY:MM:DD HH:MM:SS`). When that is missing or unreadable the filesystem
//! timestamp is used, and when even that fails the current time is used with a
//! warning. Resolving a date never fails.

use crate::events::Reporter;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Containers the EXIF reader understands.
const EXIF_CONTAINERS: &[&str] = &[
    "image/jpeg",
    "image/tiff",
    "image/heif",
    "image/avif",
    "image/png",
    "image/webp",
];

/// Granularity of the date folder inserted below a category folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateBucketMode {
    #[default]
    None,
    Year,
    YearMonth,
    YearMonthDay,
}

impl DateBucketMode {
    /// Parses a settings value. Accepts the persisted spellings
    /// (`"Year-Month"`) as well as relaxed ones (`"year_month"`, `"ym"`).
    pub fn from_setting(value: &str) -> Option<Self> {
        let key: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "none" | "" => Some(Self::None),
            "year" | "y" => Some(Self::Year),
            "yearmonth" | "ym" => Some(Self::YearMonth),
            "yearmonthday" | "ymd" => Some(Self::YearMonthDay),
            _ => None,
        }
    }

    /// Persisted spelling of the mode.
    pub fn as_setting(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Year => "Year",
            Self::YearMonth => "Year-Month",
            Self::YearMonthDay => "Year-Month-Day",
        }
    }

    /// Folder name for `date`, or `None` when bucketing is off.
    pub fn segment(&self, date: &NaiveDateTime) -> Option<String> {
        let pattern = match self {
            Self::None => return None,
            Self::Year => "%Y",
            Self::YearMonth => "%Y_%m",
            Self::YearMonthDay => "%Y_%m_%d",
        };
        Some(date.format(pattern).to_string())
    }
}

impl fmt::Display for DateBucketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_setting())
    }
}

impl Serialize for DateBucketMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_setting())
    }
}

// Unknown values are normalized here, at load time, rather than per file.
impl<'de> Deserialize<'de> for DateBucketMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_setting(&raw).unwrap_or_else(|| {
            tracing::warn!("Unknown date format '{}'. Date sorting disabled.", raw);
            Self::None
        }))
    }
}

/// Which filesystem timestamp stands in for a file's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    #[default]
    Modified,
    Created,
}

/// Resolves effective dates for one engine instance.
#[derive(Debug, Clone)]
pub struct DateResolver {
    source: DateSource,
    image_category: String,
}

impl DateResolver {
    pub fn new(source: DateSource, image_category: impl Into<String>) -> Self {
        Self {
            source,
            image_category: image_category.into(),
        }
    }

    /// Effective date of `path`.
    ///
    /// EXIF is only consulted for files in the image category and only when
    /// `prefer_metadata` is set.
    pub fn resolve(
        &self,
        path: &Path,
        category: &str,
        prefer_metadata: bool,
        reporter: &Reporter,
    ) -> NaiveDateTime {
        if prefer_metadata
            && category == self.image_category
            && let Some(taken) = exif_date_taken(path)
        {
            return taken;
        }

        match filesystem_date(path, self.source) {
            Ok(date) => date,
            Err(e) => {
                reporter.warning(format!(
                    "Could not get date for '{}': {}. Using current date as fallback.",
                    path.display(),
                    e
                ));
                Local::now().naive_local()
            }
        }
    }
}

/// Reads the EXIF original capture time, if the file has a readable one.
pub fn exif_date_taken(path: &Path) -> Option<NaiveDateTime> {
    let kind = infer::get_from_path(path).ok()??;
    if !EXIF_CONTAINERS.contains(&kind.mime_type()) {
        return None;
    }

    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Ascii(ref values) => {
            let raw = values.first()?;
            let text = std::str::from_utf8(raw).ok()?;
            parse_exif_datetime(text)
        }
        _ => None,
    }
}

/// Parses an EXIF `YYYY:MM:DD HH:MM:SS` string.
pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim_end_matches('\0').trim(), EXIF_DATE_FORMAT).ok()
}

fn filesystem_date(path: &Path, source: DateSource) -> std::io::Result<NaiveDateTime> {
    let metadata = fs::metadata(path)?;
    let time = match source {
        DateSource::Modified => metadata.modified()?,
        // Not every platform records a birth time; the modification time is the
        // closest thing when it is missing.
        DateSource::Created => metadata.created().or_else(|_| metadata.modified())?,
    };
    Ok(DateTime::<Local>::from(time).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, Event, LogLevel};
    use crate::logging::NullLogSink;
    use chrono::{Datelike, NaiveDate};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn reporter() -> (Reporter, events::EventReceiver) {
        let (tx, rx) = events::channel();
        (Reporter::new(Arc::new(NullLogSink), tx), rx)
    }

    /// Smallest JPEG the EXIF reader accepts: SOI, one APP1 segment holding a
    /// big-endian TIFF with an Exif sub-IFD carrying `DateTimeOriginal`, EOI.
    fn jpeg_with_date_taken(date: &str) -> Vec<u8> {
        let mut ascii = date.as_bytes().to_vec();
        ascii.push(0);
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
        // IFD0: ExifIFDPointer -> 26
        tiff.extend_from_slice(&[0x00, 0x01]);
        tiff.extend_from_slice(&[0x87, 0x69, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]);
        tiff.extend_from_slice(&26u32.to_be_bytes());
        tiff.extend_from_slice(&[0, 0, 0, 0]);
        // Exif IFD: DateTimeOriginal (ASCII) -> 44
        tiff.extend_from_slice(&[0x00, 0x01]);
        tiff.extend_from_slice(&[0x90, 0x03, 0x00, 0x02]);
        tiff.extend_from_slice(&(ascii.len() as u32).to_be_bytes());
        tiff.extend_from_slice(&44u32.to_be_bytes());
        tiff.extend_from_slice(&[0, 0, 0, 0]);
        tiff.extend_from_slice(&ascii);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        let segment_len = (2 + 6 + tiff.len()) as u16;
        jpeg.extend_from_slice(&segment_len.to_be_bytes());
        jpeg.extend_from_slice(b"Exif\x00\x00");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_bucket_segments() {
        let d = date(2024, 6, 5);
        assert_eq!(DateBucketMode::None.segment(&d), None);
        assert_eq!(DateBucketMode::Year.segment(&d).as_deref(), Some("2024"));
        assert_eq!(
            DateBucketMode::YearMonth.segment(&d).as_deref(),
            Some("2024_06")
        );
        assert_eq!(
            DateBucketMode::YearMonthDay.segment(&d).as_deref(),
            Some("2024_06_05")
        );
    }

    #[test]
    fn test_bucket_mode_from_setting() {
        assert_eq!(DateBucketMode::from_setting("None"), Some(DateBucketMode::None));
        assert_eq!(DateBucketMode::from_setting("Year"), Some(DateBucketMode::Year));
        assert_eq!(
            DateBucketMode::from_setting("Year-Month"),
            Some(DateBucketMode::YearMonth)
        );
        assert_eq!(
            DateBucketMode::from_setting("year_month_day"),
            Some(DateBucketMode::YearMonthDay)
        );
        assert_eq!(DateBucketMode::from_setting("Fortnight"), None);
    }

    #[test]
    fn test_unknown_bucket_mode_deserializes_as_none() {
        let mode: DateBucketMode = serde_json::from_str("\"Decade\"").unwrap();
        assert_eq!(mode, DateBucketMode::None);
        let mode: DateBucketMode = serde_json::from_str("\"Year-Month\"").unwrap();
        assert_eq!(mode, DateBucketMode::YearMonth);
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"Year-Month\"");
    }

    #[test]
    fn test_parse_exif_datetime() {
        assert_eq!(
            parse_exif_datetime("2023:05:01 10:00:00"),
            NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
        );
        assert_eq!(parse_exif_datetime("2023-05-01 10:00:00"), None);
        assert_eq!(parse_exif_datetime("    :  :     :  :  "), None);
    }

    #[test]
    fn test_exif_date_read_from_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, jpeg_with_date_taken("2023:05:01 10:00:00")).unwrap();

        let taken = exif_date_taken(&path).expect("EXIF date should be readable");
        assert_eq!(taken.year(), 2023);
        assert_eq!(taken.month(), 5);
        assert_eq!(taken.day(), 1);
    }

    #[test]
    fn test_exif_ignored_for_non_image_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, "not an image at all").unwrap();
        assert_eq!(exif_date_taken(&path), None);
    }

    #[test]
    fn test_resolve_prefers_exif_for_image_category() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, jpeg_with_date_taken("2019:12:31 23:59:59")).unwrap();
        let (reporter, rx) = reporter();
        let resolver = DateResolver::new(DateSource::Modified, "Images");

        let resolved = resolver.resolve(&path, "Images", true, &reporter);
        assert_eq!(resolved.year(), 2019);

        // Same file in another category, or with metadata disabled, uses the mtime.
        let now_year = Local::now().year();
        assert_eq!(resolver.resolve(&path, "Documents", true, &reporter).year(), now_year);
        assert_eq!(resolver.resolve(&path, "Images", false, &reporter).year(), now_year);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_resolve_falls_back_silently_to_filesystem_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();
        let (reporter, rx) = reporter();
        let resolver = DateResolver::new(DateSource::Created, "Images");

        let resolved = resolver.resolve(&path, "Images", true, &reporter);
        assert_eq!(resolved.year(), Local::now().year());
        assert!(rx.drain().is_empty(), "metadata failures are silent");
    }

    #[test]
    fn test_resolve_missing_file_warns_and_uses_now() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");
        let (reporter, rx) = reporter();
        let resolver = DateResolver::new(DateSource::Modified, "Images");

        let before = Local::now().naive_local();
        let resolved = resolver.resolve(&path, "Documents", true, &reporter);
        assert!(resolved >= before);

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::Log { level: LogLevel::Warning, text } if text.contains("gone.txt")
        ));
    }
}
