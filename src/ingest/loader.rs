use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook, Data, Range, Reader, Xls, Xlsb, Xlsx};
use tracing::debug;

use crate::core::errors::PipelineError;

/// One extracted unit of text (a spreadsheet row) with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedElement {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Declared-MIME values accepted per extension. Browsers disagree on CSV
/// types, so that list is deliberately wide.
const MIME_TYPES: &[(&str, &[&str])] = &[
    (
        "csv",
        &[
            "text/csv",
            "text/plain",
            "application/vnd.ms-excel",
            "application/csv",
            "text/x-csv",
        ],
    ),
    (
        "xlsx",
        &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"],
    ),
    ("xls", &["application/vnd.ms-excel"]),
    ("xlt", &["application/vnd.ms-excel"]),
    ("xlsm", &["application/vnd.ms-excel.sheet.macroEnabled.12"]),
    ("xlsb", &["application/vnd.ms-excel.sheet.binary.macroEnabled.12"]),
    (
        "xltx",
        &["application/vnd.openxmlformats-officedocument.spreadsheetml.template"],
    ),
    ("xltm", &["application/vnd.ms-excel.template.macroEnabled.12"]),
];

pub fn allowed_mimes(extension: &str) -> Option<&'static [&'static str]> {
    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mimes)| *mimes)
}

pub fn mime_matches(extension: &str, content_type: &str) -> bool {
    match allowed_mimes(extension) {
        Some(mimes) => mimes.contains(&content_type),
        None => false,
    }
}

/// Turns uploaded spreadsheet files into row elements. CSV parsing happens
/// in-place; workbook formats go through calamine on a blocking thread.
#[derive(Debug, Clone)]
pub struct FileLoader {
    allowed_extensions: Vec<String>,
}

impl FileLoader {
    pub fn new(allowed_extensions: &[String]) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Returns the normalized extension, or `UnsupportedFileType` before any
    /// file I/O happens.
    pub fn validate_extension(&self, filename: &str) -> Result<String, PipelineError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| PipelineError::UnsupportedFileType(filename.to_string()))?;

        if self.allowed_extensions.iter().any(|ext| *ext == extension) {
            Ok(extension)
        } else {
            Err(PipelineError::UnsupportedFileType(format!(".{}", extension)))
        }
    }

    pub async fn load(
        &self,
        path: &Path,
        original_name: &str,
    ) -> Result<Vec<LoadedElement>, PipelineError> {
        let extension = self.validate_extension(original_name)?;
        let file_error = |reason: String| PipelineError::FileLoad {
            file: original_name.to_string(),
            reason,
        };

        let elements = if extension == "csv" {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|err| file_error(err.to_string()))?;
            parse_csv(&decode_csv_bytes(&bytes)).map_err(|err| file_error(err.to_string()))?
        } else {
            let path = path.to_path_buf();
            let ext = extension.clone();
            tokio::task::spawn_blocking(move || parse_workbook(&path, &ext))
                .await
                .map_err(|err| file_error(err.to_string()))?
                .map_err(|err| file_error(err.to_string()))?
        };

        debug!(
            "Extracted {} row elements from '{}'",
            elements.len(),
            original_name
        );
        Ok(elements)
    }
}

/// Strips a UTF-8 BOM if present and decodes the rest lossily, so files
/// exported from Excel as "CSV UTF-8" load without a mangled first header.
fn decode_csv_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_csv(text: &str) -> Result<Vec<LoadedElement>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut elements = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|cell| cell.trim().to_string()).collect();
        let text = row_text(&headers, &cells);
        if text.is_empty() {
            continue;
        }

        let mut metadata = BTreeMap::new();
        // Row numbers count the header as line 1.
        metadata.insert("row".to_string(), (index + 2).to_string());
        elements.push(LoadedElement { text, metadata });
    }
    Ok(elements)
}

fn parse_workbook(path: &Path, extension: &str) -> Result<Vec<LoadedElement>, calamine::Error> {
    let mut elements = Vec::new();
    for (sheet, range) in read_ranges(path, extension)? {
        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let formatted = format_cell(cell);
                if formatted.is_empty() {
                    format!("col_{}", index + 1)
                } else {
                    formatted
                }
            })
            .collect();

        for (index, row) in rows.enumerate() {
            let cells: Vec<String> = row.iter().map(format_cell).collect();
            let text = row_text(&headers, &cells);
            if text.is_empty() {
                continue;
            }

            let mut metadata = BTreeMap::new();
            metadata.insert("sheet".to_string(), sheet.clone());
            metadata.insert("row".to_string(), (index + 2).to_string());
            elements.push(LoadedElement { text, metadata });
        }
    }
    Ok(elements)
}

/// Opens the workbook with the reader matching its extension. The template
/// formats share their base format's reader, which plain auto-detection
/// does not cover.
fn read_ranges(
    path: &Path,
    extension: &str,
) -> Result<Vec<(String, Range<Data>)>, calamine::Error> {
    match extension {
        "xlsx" | "xlsm" | "xltx" | "xltm" => {
            let mut workbook: Xlsx<_> = open_workbook(path)?;
            collect_ranges(&mut workbook)
        }
        "xls" | "xlt" => {
            let mut workbook: Xls<_> = open_workbook(path)?;
            collect_ranges(&mut workbook)
        }
        "xlsb" => {
            let mut workbook: Xlsb<_> = open_workbook(path)?;
            collect_ranges(&mut workbook)
        }
        _ => Err(calamine::Error::Msg("no workbook reader for this extension")),
    }
}

fn collect_ranges<R>(workbook: &mut R) -> Result<Vec<(String, Range<Data>)>, calamine::Error>
where
    R: Reader<std::io::BufReader<std::fs::File>>,
    calamine::Error: From<R::Error>,
{
    let mut ranges = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet)?;
        ranges.push((sheet, range));
    }
    Ok(ranges)
}

/// "header: value" pairs joined with single spaces; empty cells drop out.
fn row_text(headers: &[String], cells: &[String]) -> String {
    headers
        .iter()
        .zip(cells)
        .filter(|(_, value)| !value.is_empty())
        .map(|(header, value)| format!("{}: {}", header, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.trim().to_string(),
        Data::Float(value) => {
            if value.fract() == 0.0 && value.abs() < 1e15 {
                format!("{}", *value as i64)
            } else {
                value.to_string()
            }
        }
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => format!("{:.0}", value.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => text.trim().to_string(),
        Data::Error(err) => format!("[Error: {}]", err),
    }
}
