use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag, Value};
use image::ImageFormat;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use tracing::debug;

const THUMB_SIZE: u32 = 256;
const EXIF_DATETIME_FMT: &str = "%Y:%m:%d %H:%M:%S";

/// Metadata pulled from a file's EXIF block. Every field is optional;
/// unreadable or absent EXIF yields the default.
#[derive(Debug, Default, Clone)]
pub struct ExifMeta {
    /// Capture date, when present and parseable.
    pub capture_date: Option<NaiveDateTime>,
    /// Decimal-degree GPS coordinates, when present and parseable.
    pub gps: Option<(f64, f64)>,
}

/// Reads EXIF capture date and GPS coordinates from an image file.
/// Failures of any kind yield an empty [`ExifMeta`], never an error.
pub fn read_exif(path: &Path) -> ExifMeta {
    let Ok(file) = File::open(path) else {
        return ExifMeta::default();
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = Reader::new().read_from_container(&mut reader) else {
        return ExifMeta::default();
    };

    let capture_date = ascii_field(&exif, Tag::DateTimeOriginal)
        .or_else(|| ascii_field(&exif, Tag::DateTime))
        .and_then(|s| parse_exif_datetime(&s));

    let gps = match (
        rational3(&exif, Tag::GPSLatitude),
        ascii_field(&exif, Tag::GPSLatitudeRef),
        rational3(&exif, Tag::GPSLongitude),
        ascii_field(&exif, Tag::GPSLongitudeRef),
    ) {
        (Some(lat), lat_ref, Some(lon), lon_ref) => {
            let lat = dms_to_decimal(lat, lat_ref.as_deref().unwrap_or("N"));
            let lon = dms_to_decimal(lon, lon_ref.as_deref().unwrap_or("E"));
            Some((lat, lon))
        }
        _ => None,
    };

    ExifMeta { capture_date, gps }
}

fn ascii_field(exif: &exif::Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn rational3(exif: &exif::Exif, tag: Tag) -> Option<[f64; 3]> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            Some([parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64()])
        }
        _ => None,
    }
}

/// Parses the EXIF datetime format `YYYY:MM:DD HH:MM:SS`. Malformed
/// values are treated as absent, not fatal.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), EXIF_DATETIME_FMT).ok()
}

/// Converts degrees/minutes/seconds to decimal degrees, with the sign
/// taken from the hemisphere reference tag (`S`/`W` negative).
pub fn dms_to_decimal(dms: [f64; 3], hemisphere: &str) -> f64 {
    let decimal = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    match hemisphere.trim().to_ascii_uppercase().as_str() {
        "S" | "W" => -decimal,
        _ => decimal,
    }
}

/// Filesystem (created, modified) times for a file. Platforms without a
/// creation time fall back to the modification time.
pub fn file_times(path: &Path) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    let Ok(meta) = path.metadata() else {
        return (now, now);
    };
    let modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or(now);
    let created = meta.created().map(DateTime::<Utc>::from).unwrap_or(modified);
    (created, modified)
}

/// Renders a small JPEG preview of the image. Generation failure yields a
/// fixed gray placeholder, never an error.
pub fn thumbnail_bytes(path: &Path) -> Vec<u8> {
    match render_thumbnail(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "thumbnail failed, using placeholder");
            placeholder_thumbnail()
        }
    }
}

fn render_thumbnail(path: &Path) -> Result<Vec<u8>, image::ImageError> {
    let img = image::open(path)?;
    let thumb = img.thumbnail(THUMB_SIZE, THUMB_SIZE).to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    thumb.write_to(&mut buf, ImageFormat::Jpeg)?;
    Ok(buf.into_inner())
}

fn placeholder_thumbnail() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(THUMB_SIZE, THUMB_SIZE, image::Rgb([100, 100, 100]));
    let mut buf = Cursor::new(Vec::new());
    if img.write_to(&mut buf, ImageFormat::Jpeg).is_err() {
        return Vec::new();
    }
    buf.into_inner()
}
