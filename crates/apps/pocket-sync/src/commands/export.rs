use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result, bail};
use log::info;
use pocket::{
    Credentials, Error, ExportFormat, ExportRequest, ExportTable, Exporter, ItemStatus,
    SqliteItemStore, Window,
};

use crate::cli::ExportArgs;

pub fn run_export(args: &ExportArgs) -> Result<()> {
    let request = build_request(args)?;
    request.validate()?;

    if request.format == ExportFormat::Karakeep {
        Credentials::load(&args.auth)?.require_karakeep_token()?;
    }

    if !args.db_path.exists() {
        bail!("Database not found: {}", args.db_path.display());
    }
    let store = SqliteItemStore::new(&args.db_path)
        .with_context(|| format!("Failed to open database {}", args.db_path.display()))?;
    let exporter = Exporter::new(&store);

    if !args.silent {
        let total = exporter.count(&request)?;
        eprintln!("Exporting {total} rows from {} as {}", request.table, request.format);
    }

    let report = match (&args.output, request.dry_run) {
        (Some(path), false) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            let report = exporter.export(&request, &mut out)?;
            out.flush()?;
            report
        }
        _ => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            exporter.export(&request, &mut out)?
        }
    };

    if request.dry_run {
        for id in &report.ids {
            println!("{id}");
        }
    }

    info!(
        "[EXPORT] {} rows exported, {} skipped",
        report.exported, report.skipped
    );
    if !args.silent && report.skipped > 0 {
        eprintln!("Skipped {} items without a URL", report.skipped);
    }
    Ok(())
}

fn build_request(args: &ExportArgs) -> Result<ExportRequest> {
    let mut request = ExportRequest::new(args.format.parse::<ExportFormat>()?);
    request.table = args.table.parse::<ExportTable>()?;
    request.filter.status = args
        .filter_status
        .as_deref()
        .map(|status| status.parse::<ItemStatus>().map_err(Error::InvalidFilter))
        .transpose()?;
    request.filter.favorite = args.filter_favorite.then_some(true);
    request.window = Window::new(args.offset, args.limit);
    request.dry_run = args.dry_run;
    Ok(request)
}
