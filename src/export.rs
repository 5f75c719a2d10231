//! Spreadsheet export of the registration list.

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::error::{AppError, AppResult};
use crate::i18n::{Language, TranslationKey, t};
use crate::registration::Registration;

pub const SHEET_NAME: &str = "Registrations";

const HEADER_FILL: u32 = 0xB45309;
const STRIPE_FILL: u32 = 0xF5F5F4;

const COLUMN_WIDTHS: [f64; 9] = [5.0, 20.0, 25.0, 30.0, 15.0, 15.0, 20.0, 15.0, 40.0];

/// #, category and status are centered
const CENTERED_COLUMNS: [u16; 3] = [0, 6, 7];

const HEADERS: [TranslationKey; 9] = [
    TranslationKey::RegistrationNumber,
    TranslationKey::SubmissionDate,
    TranslationKey::FullName,
    TranslationKey::Email,
    TranslationKey::NationalId,
    TranslationKey::Phone,
    TranslationKey::Category,
    TranslationKey::Status,
    TranslationKey::AttachmentsColumn,
];

/// Translated header row
pub fn header_row(language: Language) -> Vec<&'static str> {
    HEADERS.iter().map(|key| t(*key, language)).collect()
}

/// The eight text columns following the row number
fn row_values(registration: &Registration, language: Language) -> [String; 8] {
    let or_dash = |s: &str| {
        if s.trim().is_empty() {
            "-".to_string()
        } else {
            s.to_string()
        }
    };

    [
        registration
            .submission_date
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        registration.full_name.clone(),
        registration.email.clone(),
        or_dash(&registration.national_id),
        or_dash(&registration.phone),
        registration.category.label(language).to_string(),
        registration.status.label(language).to_string(),
        registration.attachment_names.join(", "),
    ]
}

fn refuse_empty(registrations: &[Registration]) -> AppResult<()> {
    if registrations.is_empty() {
        return Err(AppError::Validation("There are no registrations to export".to_string()));
    }
    Ok(())
}

fn cell_format(striped: bool, centered: bool) -> Format {
    let mut format = Format::new().set_border(FormatBorder::Thin);
    if striped {
        format = format.set_background_color(Color::RGB(STRIPE_FILL));
    }
    if centered {
        format = format.set_align(FormatAlign::Center);
    }
    format
}

/// Convert registrations to a styled XLSX workbook
///
/// The rows are written in the order given, so the caller decides the sort
/// and filter.
///
/// # Arguments
/// * `registrations` - Rows to export, must not be empty
/// * `language` - Language of the header row and of the category / status labels
///
/// # Returns
/// * `AppResult<Vec<u8>>` - XLSX file content as bytes
pub fn to_xlsx(registrations: &[Registration], language: Language) -> AppResult<Vec<u8>> {
    refuse_empty(registrations)?;

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(SHEET_NAME)?;

    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);

    for (col, title) in header_row(language).into_iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, title, &header)?;
    }

    // [striped][centered]
    let formats = [
        [cell_format(false, false), cell_format(false, true)],
        [cell_format(true, false), cell_format(true, true)],
    ];

    for (index, registration) in registrations.iter().enumerate() {
        let row = index as u32 + 1;
        let striped = usize::from(row % 2 == 0);
        let format_for = |col: u16| &formats[striped][usize::from(CENTERED_COLUMNS.contains(&col))];

        worksheet.write_number_with_format(row, 0, (index + 1) as f64, format_for(0))?;
        for (offset, value) in row_values(registration, language).iter().enumerate() {
            let col = offset as u16 + 1;
            worksheet.write_string_with_format(row, col, value, format_for(col))?;
        }
    }

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }
    worksheet.autofilter(0, 0, 0, (HEADERS.len() - 1) as u16)?;

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    log::info!("exported {} registration(s) to xlsx", registrations.len());
    Ok(buffer)
}

/// Same columns as [`to_xlsx`], comma-separated
pub fn to_csv(registrations: &[Registration], language: Language) -> AppResult<String> {
    refuse_empty(registrations)?;

    let mut csv_content = String::new();
    push_csv_line(&mut csv_content, header_row(language));

    for (index, registration) in registrations.iter().enumerate() {
        let number = (index + 1).to_string();
        let values = row_values(registration, language);
        push_csv_line(
            &mut csv_content,
            std::iter::once(number.as_str()).chain(values.iter().map(String::as_str)),
        );
    }

    Ok(csv_content)
}

fn push_csv_line<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, value) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Escape commas, quotes and newlines
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            out.push_str(&format!("\"{}\"", value.replace('"', "\"\"")));
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}
