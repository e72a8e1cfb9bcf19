//! Payslip rendering with genpdf.

use genpdf::{Alignment, Element, elements, style};

use crate::{
    domain::payroll::format_rupiah,
    error::{ApiError, ApiResult},
    model::payroll::PayrollSlip,
};

const MONTHS: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni", "Juli", "Agustus", "September",
    "Oktober", "November", "Desember",
];

/// Who the slip belongs to, as printed in the header.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SlipHolder {
    pub full_name: String,
    pub nik: Option<String>,
    pub outlet_name: Option<String>,
}

/// `Januari 2026`
pub fn period_label(slip: &PayrollSlip) -> String {
    use chrono::Datelike;
    let month = MONTHS
        .get(slip.period.month0() as usize)
        .copied()
        .unwrap_or("?");
    format!("{} {}", month, slip.period.year())
}

/// Earnings and deductions rows, in print order.
pub fn amount_rows(slip: &PayrollSlip) -> Vec<(&'static str, String)> {
    vec![
        ("Gaji Pokok", format_rupiah(slip.base_salary)),
        ("Tunjangan", format_rupiah(slip.allowance)),
        ("Lembur", format_rupiah(slip.overtime)),
        ("Bonus", format_rupiah(slip.bonus)),
        ("Potongan", format!("- {}", format_rupiah(slip.deductions))),
    ]
}

pub fn attendance_rows(slip: &PayrollSlip) -> Vec<(&'static str, String)> {
    vec![
        ("Hadir", format!("{} hari", slip.days_present)),
        ("Terlambat", format!("{} hari", slip.days_late)),
        ("Mangkir", format!("{} hari", slip.days_absent)),
        ("Cuti", format!("{} hari", slip.days_leave)),
    ]
}

fn pdf_error(e: genpdf::error::Error) -> ApiError {
    ApiError::internal(format!("payslip rendering failed: {e}"))
}

fn two_column_table(rows: Vec<(&'static str, String)>) -> ApiResult<elements::TableLayout> {
    let mut table = elements::TableLayout::new(vec![3, 2]);
    table.set_cell_decorator(elements::FrameCellDecorator::new(false, true, false));
    for (label, value) in rows {
        let mut amount = elements::Paragraph::new(value);
        amount.set_alignment(Alignment::Right);
        table
            .row()
            .element(elements::Paragraph::new(label).padded(1))
            .element(amount.padded(1))
            .push()
            .map_err(pdf_error)?;
    }
    Ok(table)
}

/// Renders the slip to PDF bytes. Blocking; call from `web::block`.
pub fn render(
    slip: &PayrollSlip,
    holder: &SlipHolder,
    fonts_dir: &str,
    font_family: &str,
) -> ApiResult<Vec<u8>> {
    let fonts = genpdf::fonts::from_files(fonts_dir, font_family, None).map_err(|e| {
        ApiError::internal(format!("font family {font_family} not found in {fonts_dir}: {e}"))
    })?;

    let mut doc = genpdf::Document::new(fonts);
    doc.set_title(format!("Slip Gaji {}", period_label(slip)));
    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(12);
    doc.set_page_decorator(decorator);

    doc.push(
        elements::Paragraph::new("SLIP GAJI").styled(style::Style::new().bold().with_font_size(18)),
    );
    doc.push(elements::Paragraph::new(format!("Periode: {}", period_label(slip))));
    doc.push(elements::Break::new(1));

    doc.push(elements::Paragraph::new(format!("Nama: {}", holder.full_name)));
    if let Some(nik) = &holder.nik {
        doc.push(elements::Paragraph::new(format!("NIK: {nik}")));
    }
    if let Some(outlet) = &holder.outlet_name {
        doc.push(elements::Paragraph::new(format!("Outlet: {outlet}")));
    }
    doc.push(elements::Break::new(1.5));

    doc.push(
        elements::Paragraph::new("Rincian").styled(style::Style::new().bold().with_font_size(12)),
    );
    doc.push(two_column_table(amount_rows(slip))?);
    doc.push(elements::Break::new(1));

    let mut net = elements::Paragraph::new(format!(
        "Gaji Bersih: {}",
        format_rupiah(slip.net_salary)
    ));
    net.set_alignment(Alignment::Right);
    doc.push(net.styled(style::Style::new().bold().with_font_size(13)));
    doc.push(elements::Break::new(1.5));

    doc.push(
        elements::Paragraph::new("Kehadiran").styled(style::Style::new().bold().with_font_size(12)),
    );
    doc.push(two_column_table(attendance_rows(slip))?);
    doc.push(elements::Break::new(2));
    doc.push(
        elements::Paragraph::new("Dokumen ini dibuat otomatis dan sah tanpa tanda tangan.")
            .styled(style::Style::new().italic().with_font_size(8)),
    );

    let mut buffer = Vec::new();
    doc.render(&mut buffer).map_err(pdf_error)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn slip() -> PayrollSlip {
        PayrollSlip {
            id: 1,
            user_id: 7,
            period: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            base_salary: 4_500_000.0,
            allowance: 300_000.0,
            overtime: 150_000.0,
            bonus: 0.0,
            deductions: 50_000.0,
            net_salary: 4_900_000.0,
            days_present: 21,
            days_late: 2,
            days_absent: 1,
            days_leave: 1,
            status: "published".into(),
            created_at: NaiveDate::from_ymd_opt(2026, 4, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn period_is_spelled_in_indonesian() {
        assert_eq!(period_label(&slip()), "Maret 2026");
    }

    #[test]
    fn rows_carry_formatted_amounts() {
        let rows = amount_rows(&slip());
        assert_eq!(rows[0], ("Gaji Pokok", "Rp 4.500.000".to_string()));
        assert_eq!(rows[4], ("Potongan", "- Rp 50.000".to_string()));
        assert_eq!(attendance_rows(&slip())[2], ("Mangkir", "1 hari".to_string()));
    }

    #[test]
    fn missing_fonts_are_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let holder = SlipHolder {
            full_name: "Sari".into(),
            nik: None,
            outlet_name: None,
        };
        let err = render(&slip(), &holder, dir.path().to_str().unwrap(), "Nope").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InternalError);
    }
}
