//! QR code command handlers

use std::path::Path;

use chrono::{Duration, Utc};

use crate::config::Config;
use crate::domain::format_instant;
use crate::models::qr::QrRecord;
use crate::state::SharedState;

fn print_record(record: &QrRecord) {
    let now = Utc::now();
    let status = if record.is_valid_at(now) {
        "🟢 active"
    } else if record.is_active {
        "⌛ expired"
    } else {
        "• inactive"
    };

    println!("#{} [{}]", record.id, status);
    println!(
        "  Generated: {} | Expires: {}",
        format_instant(record.generated_at),
        format_instant(record.expiry_date)
    );
}

pub async fn cmd_qr_ensure(
    config: Config,
    company_id: i32,
    minutes: Option<i64>,
    force: bool,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    let record = state
        .qr_service
        .ensure(company_id, minutes.map(Duration::minutes), force)
        .await?;

    println!("✓ QR code ready for company {company_id}");
    print_record(&record);

    Ok(())
}

pub async fn cmd_qr_list(config: Config, company_id: i32) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    let records = state.qr_service.list_for_company(company_id).await?;

    if records.is_empty() {
        println!("No QR codes issued for company {company_id}.");
        println!();
        println!("Create one with: clockin qr ensure {company_id}");
        return Ok(());
    }

    println!("QR codes for company {} ({} total)", company_id, records.len());
    println!("{:-<70}", "");

    for record in &records {
        print_record(record);
    }

    Ok(())
}

pub async fn cmd_qr_render(
    config: Config,
    id: i32,
    out: &Path,
    base_url: Option<&str>,
    pixels_per_module: Option<u32>,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    let record = state.qr_service.get(id).await?;

    if !record.is_valid_at(Utc::now()) {
        println!("QR code #{id} is inactive or expired; nothing rendered.");
        return Ok(());
    }

    let png = state
        .qr_service
        .render_image(&record, base_url, pixels_per_module)?;
    std::fs::write(out, &png)?;

    println!("✓ Wrote {} ({} bytes)", out.display(), png.len());
    println!("  The embedded token is bound to the current time; re-render to refresh it.");

    Ok(())
}

pub async fn cmd_qr_deactivate(config: Config, company_id: i32, id: i32) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    state.qr_service.deactivate(company_id, id).await?;

    println!("✓ Deactivated QR code #{id} of company {company_id}");

    Ok(())
}
