use anyhow::{Context, Result};
use tracing::info_span;

use cms_cli::report::{column_rows, column_table, outcome_table};
use cms_core::{CmsRifUpload, UploadOutcome, describe_columns, load_config, open_store};
use cms_model::{BeneRange, JobGroup};

use crate::cli::{ColumnsArgs, RunArgs};

pub fn run_upload(args: &RunArgs) -> Result<UploadOutcome> {
    let config = load_config(&args.table.config)
        .with_context(|| format!("load config {}", args.table.config.display()))?;
    let range = BeneRange::new(args.bene_first, args.bene_last).context("bene_id range")?;
    let job = CmsRifUpload::new(config, &args.table.table, range)?
        .with_group(JobGroup {
            bene_qty: args.bene_qty,
            group_num: args.group_num,
            group_qty: args.group_qty,
        })
        .with_user(args.user.clone());
    let span = info_span!("job", table = %args.table.table, first = range.first);
    let _guard = span.enter();
    let outcome = job
        .run()
        .with_context(|| format!("upload {}", job.label()))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome_table(&outcome));
    }
    Ok(outcome)
}

pub fn run_columns(args: &ColumnsArgs) -> Result<()> {
    let config = load_config(&args.table.config)
        .with_context(|| format!("load config {}", args.table.config.display()))?;
    let store = open_store(&config).context("open database")?;
    let descriptors = describe_columns(&config, &args.table.table, &store)?;
    let rows = column_rows(&descriptors);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", column_table(&rows));
    }
    Ok(())
}
