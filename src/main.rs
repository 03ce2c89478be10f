use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use qradmin::api::{HttpQrBackend, QrBackend};
use qradmin::config::Config;
use qradmin::encryption::TokenEncoder;
use qradmin::export::{
    download_image, export_csv, export_zip, select_targets, HttpImageFetcher, ImageDownload,
};
use qradmin::generator::{generate, preview};
use qradmin::models::{QrRecord, RecordPatch, SyncStatus};
use qradmin::qr_image::QrImageEncoder;
use qradmin::query::{
    DateRangeFilter, ListFilter, QueryController, QueryFilter, QueryRequest, SerialFilter,
    SortOrder,
};
use qradmin::session::Session;
use qradmin::upload::{Confirm, UploadConfig, UploadPipeline, UploadProgress};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "qradmin", version, about = "Generate, upload and manage serial QR codes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the credential in the system keyring
    Login {
        #[arg(long, env = "QR_ADMIN_EMAIL")]
        email: String,
        #[arg(long, env = "QR_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored credential
    Logout,
    /// Preview tokens and redirect URLs for a serial range
    Generate {
        #[command(flatten)]
        range: RangeArgs,
        /// Print every item instead of the first 50
        #[arg(long)]
        all: bool,
    },
    /// Generate a serial range and save it to the backend
    Upload {
        #[command(flatten)]
        range: RangeArgs,
        /// Skip the confirmation prompt for large batches
        #[arg(short, long)]
        yes: bool,
        /// One record per request with a one second pause
        #[arg(long)]
        throttled: bool,
    },
    /// Page through all records
    List {
        #[command(flatten)]
        paging: PageArgs,
    },
    /// Search records by creation date
    SearchDate {
        #[command(flatten)]
        dates: DateArgs,
        #[command(flatten)]
        paging: PageArgs,
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Search by serial (`12`) or serial range (`1-20`, `1~20`)
    SearchSerial {
        query: String,
        #[command(flatten)]
        paging: PageArgs,
        #[command(flatten)]
        sort: SortArgs,
    },
    /// Edit a record's message, date or item name
    Edit {
        serial: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        created_date: Option<String>,
        #[arg(long)]
        item_name: Option<String>,
    },
    /// Export search results as a ZIP of images or a CSV of URLs
    Export {
        #[arg(value_enum)]
        format: ExportFormat,
        /// Serial or serial range to export
        #[arg(long, conflicts_with_all = ["from", "to"])]
        serial: Option<String>,
        #[command(flatten)]
        dates: DateArgs,
        /// Only these serials from the results
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
        /// Output directory (defaults to Downloads)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Download one record's QR image
    Image {
        serial: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Decrypt a token back to its serial
    Decode { token: String },
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long)]
    start: i64,
    #[arg(long)]
    end: i64,
}

#[derive(Args)]
struct PageArgs {
    /// First page to load (1-based)
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Keep loading following pages, appending results
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

#[derive(Args)]
struct DateArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long, value_enum, conflicts_with_all = ["from", "to"])]
    range: Option<QuickRange>,
}

impl DateArgs {
    fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.range.is_none()
    }

    fn filter(&self) -> Result<DateRangeFilter> {
        Ok(match self.range {
            Some(QuickRange::Today) => DateRangeFilter::today(),
            Some(QuickRange::Week) => DateRangeFilter::last_7_days(),
            Some(QuickRange::Month) => DateRangeFilter::last_30_days(),
            None => DateRangeFilter::new(self.from, self.to)?,
        })
    }
}

#[derive(Args)]
struct SortArgs {
    /// Sort field, e.g. `serial` or `createdDate`
    #[arg(long)]
    sort: Option<String>,
    #[arg(long, requires = "sort")]
    desc: bool,
}

impl SortArgs {
    fn order(&self) -> Option<SortOrder> {
        self.sort.as_ref().map(|field| {
            if self.desc {
                SortOrder::desc(field)
            } else {
                SortOrder::asc(field)
            }
        })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum QuickRange {
    Today,
    Week,
    Month,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Zip,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    // Use RUST_LOG env var if set, otherwise info (debug with QR_DEBUG)
    let default_level = if config.debug { "debug" } else { "info" };
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let encoder = TokenEncoder::new(&config.aes_key, &config.aes_iv)
        .context("Invalid token key material")?;

    match cli.command {
        Command::Generate { range, all } => {
            let items = generate(&config.redirect_base_url, range.start, range.end, &encoder);
            for item in preview(&items, all) {
                println!("{}\t{}", item.code, item.url);
            }
            if !all && items.len() > preview(&items, false).len() {
                println!("... {} items in total (use --all to print every item)", items.len());
            }
            Ok(())
        }
        Command::Decode { token } => {
            println!("{}", encoder.decode(&token)?);
            Ok(())
        }
        command => run_remote(command, &config, &encoder).await,
    }
}

/// Commands that talk to the backend
async fn run_remote(command: Command, config: &Config, encoder: &TokenEncoder) -> Result<()> {
    let session = match Session::from_keyring() {
        Ok(session) => session,
        Err(e) => {
            warn!("Keyring unavailable ({}), credential will not persist", e);
            Session::in_memory()
        }
    };
    let http = HttpQrBackend::new(&config.api_base_url, session.clone());
    let backend: Arc<dyn QrBackend> = Arc::new(http);

    match command {
        Command::Login { email, password } => {
            let login = backend.login(&email, &password).await?;
            if login.access_token.is_none() {
                bail!("Login response carried no access token");
            }
            info!("Signed in as {}", email);
            Ok(())
        }
        Command::Logout => {
            session.clear()?;
            info!("Signed out");
            Ok(())
        }
        Command::Upload {
            range,
            yes,
            throttled,
        } => {
            let upload_config = if throttled {
                UploadConfig {
                    item_name: config.upload.item_name.clone(),
                    ..UploadConfig::throttled()
                }
            } else {
                config.upload.clone()
            };
            let items = generate(&config.redirect_base_url, range.start, range.end, encoder);

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                let mut bar: Option<ProgressBar> = None;
                while let Some(event) = rx.recv().await {
                    match event {
                        UploadProgress::Started { total } => {
                            bar = Some(upload_progress_bar(total));
                        }
                        UploadProgress::SaveSucceeded {
                            processed, percent, ..
                        } => {
                            if let Some(bar) = &bar {
                                bar.set_position(processed as u64);
                                bar.set_message(format!("{}%", percent));
                            }
                        }
                        UploadProgress::SaveFailed { chunk_index, .. } => {
                            if let Some(bar) = bar.take() {
                                bar.abandon_with_message(format!("chunk {} failed", chunk_index + 1));
                            }
                        }
                        UploadProgress::Complete { .. } => {
                            if let Some(bar) = bar.take() {
                                bar.finish_with_message("done");
                            }
                        }
                        UploadProgress::SaveRequested { .. } => {}
                    }
                }
            });

            let pipeline = UploadPipeline::new(
                backend.clone(),
                QrImageEncoder::new(config.image),
                upload_config,
            )
            .with_progress(tx);
            let confirm = if yes {
                Confirm::Bypass
            } else {
                Confirm::ask(confirm_large_batch)
            };

            let result = pipeline.upload(&items, confirm).await;
            drop(pipeline);
            if let Err(e) = printer.await {
                warn!("Progress display task failed: {}", e);
            }

            let report = result?;
            println!(
                "Saved {} records in {} chunks (created {})",
                report.total, report.chunks, report.created_date
            );
            Ok(())
        }
        Command::List { paging } => {
            let mut controller = QueryController::<ListFilter>::new(
                backend,
                config.page_base,
                config.list_schema,
            );
            let records = fetch_pages(&mut controller, &paging, ListFilter, None).await?;
            print_records(&records, controller.state().total());
            Ok(())
        }
        Command::SearchDate {
            dates,
            paging,
            sort,
        } => {
            let mut controller = QueryController::<DateRangeFilter>::new(
                backend,
                config.page_base,
                config.list_schema,
            );
            let records = fetch_pages(&mut controller, &paging, dates.filter()?, sort.order())
                .await?;
            print_records(&records, controller.state().total());
            Ok(())
        }
        Command::SearchSerial {
            query,
            paging,
            sort,
        } => {
            let filter = SerialFilter::parse(&query)?;
            let mut controller = QueryController::<SerialFilter>::new(
                backend,
                config.page_base,
                config.list_schema,
            );
            let records = fetch_pages(&mut controller, &paging, filter, sort.order()).await?;
            print_records(&records, controller.state().total());
            Ok(())
        }
        Command::Edit {
            serial,
            message,
            created_date,
            item_name,
        } => {
            let filter = SerialFilter::parse(&serial)?;
            let SerialFilter::Exact(serial) = filter else {
                bail!("Edit takes a single serial, not a range");
            };

            let mut controller = QueryController::<SerialFilter>::new(
                backend,
                config.page_base,
                config.list_schema,
            );
            controller
                .fetch(QueryRequest::new(1, SerialFilter::Exact(serial.clone())))
                .await?;

            let mut patch = RecordPatch::for_serial(serial.as_str());
            patch.message = message;
            patch.created_date = created_date;
            patch.item_name = item_name;

            match controller.update(patch).await? {
                Some(record) => {
                    print_records(std::slice::from_ref(&record), 1);
                    Ok(())
                }
                None => bail!("No record with serial {}", serial),
            }
        }
        Command::Export {
            format,
            serial,
            dates,
            select,
            out,
        } => {
            let records = match serial {
                Some(query) => {
                    let mut controller = QueryController::<SerialFilter>::new(
                        backend,
                        config.page_base,
                        config.list_schema,
                    );
                    let paging = PageArgs { page: 1, pages: u32::MAX };
                    fetch_pages(&mut controller, &paging, SerialFilter::parse(&query)?, None)
                        .await?
                }
                None if !dates.is_empty() => {
                    let mut controller = QueryController::<DateRangeFilter>::new(
                        backend,
                        config.page_base,
                        config.list_schema,
                    );
                    let paging = PageArgs { page: 1, pages: u32::MAX };
                    fetch_pages(&mut controller, &paging, dates.filter()?, None).await?
                }
                None => bail!("Export needs --serial or a date range"),
            };

            let targets = select_targets(&records, &select)?;
            let artifact = match format {
                ExportFormat::Zip => export_zip(&targets, &HttpImageFetcher::new()).await?,
                ExportFormat::Csv => export_csv(&targets)?,
            };
            let dir = out.unwrap_or_else(|| config.export_dir());
            let path = artifact.write_to(&dir)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Image { serial, out } => {
            let filter = SerialFilter::parse(&serial)?;
            let mut controller = QueryController::<SerialFilter>::new(
                backend,
                config.page_base,
                config.list_schema,
            );
            controller.fetch(QueryRequest::new(1, filter)).await?;
            let Some(record) = controller.state().records().first().cloned() else {
                bail!("No record with serial {}", serial);
            };

            match download_image(&record, &HttpImageFetcher::new()).await? {
                ImageDownload::Bytes { file_name, bytes } => {
                    let dir = out.unwrap_or_else(|| config.export_dir());
                    std::fs::create_dir_all(&dir)?;
                    let path = dir.join(file_name);
                    std::fs::write(&path, bytes)?;
                    println!("{}", path.display());
                }
                ImageDownload::OpenExternally(url) => {
                    println!("Could not download the image, open it directly: {}", url);
                }
            }
            Ok(())
        }
        Command::Generate { .. } | Command::Decode { .. } => Ok(()),
    }
}

/// Load `paging.pages` pages starting at `paging.page`, appending after the
/// first, and stop early once every record is loaded
async fn fetch_pages<F: QueryFilter>(
    controller: &mut QueryController<F>,
    paging: &PageArgs,
    filter: F,
    sort: Option<SortOrder>,
) -> Result<Vec<QrRecord>> {
    let mut page = paging.page.max(1);
    let mut request = QueryRequest::new(page, filter.clone());
    request.sort = sort.clone();
    controller.fetch(request).await?;

    for _ in 1..paging.pages {
        let state = controller.state();
        if state.records().is_empty() || state.records().len() as u64 >= state.total() {
            break;
        }
        page += 1;
        let mut request = QueryRequest::new(page, filter.clone()).append();
        request.sort = sort.clone();
        let before = controller.state().records().len();
        controller.fetch(request).await?;
        if controller.state().records().len() == before {
            break;
        }
    }

    Ok(controller.state().records().to_vec())
}

fn print_records(records: &[QrRecord], total: u64) {
    for r in records {
        let marker = match &r.sync {
            SyncStatus::Synced => String::new(),
            SyncStatus::Pending => " (saving)".to_string(),
            SyncStatus::Unsynced { error } => format!(" (not saved: {})", error),
        };
        println!(
            "{}\t{}\t{}\t{}\t{}{}",
            r.serial, r.created_date, r.item_name, r.message, r.qr_url, marker
        );
    }
    println!("{} of {} records", records.len(), total);
}

/// Ask before a large upload. A prompt that cannot be shown is a refusal.
fn confirm_large_batch(count: usize) -> bool {
    dialoguer::Confirm::new()
        .with_prompt(format!("Upload {} records? This may take a while.", count))
        .default(false)
        .interact()
        .unwrap_or_else(|e| {
            warn!("Upload confirmation prompt failed: {}", e);
            false
        })
}

fn upload_progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    match ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        Ok(style) => bar.set_style(style.progress_chars("#>-")),
        Err(e) => warn!("Progress bar template rejected: {}", e),
    }
    bar
}
