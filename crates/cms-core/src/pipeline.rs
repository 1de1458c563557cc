//! The CMS RIF upload job.
//!
//! One job loads one source table restricted to an inclusive bene_id range
//! into its own `observation_fact_<upload_id>` table. Per chunk:
//!
//! 1. **select** - next bounded chunk from the [`ChunkReader`]
//! 2. **stack diagnoses / pivot** - [`ChunkReshaper`] into source facts
//! 3. **mapping** - [`IdentityMapper`] to patient and encounter numbers
//! 4. **bulk insert** - admin stamp, fact frame, one append transaction
//! 5. **progress** - [`UploadTracker::record_chunk`]
//!
//! # Example
//!
//! ```ignore
//! use cms_core::CmsRifUpload;
//!
//! let job = CmsRifUpload::new(config, "bcarrier_claims", range)?
//!     .with_group(group)
//!     .with_user("etl");
//! let outcome = job.run()?;
//! ```

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use cms_ingest::{ChunkReader, ReadOptions};
use cms_map::{IdentityMapper, SURROGATE_SCHEME};
use cms_model::{
    AdminStamp, BeneRange, ColumnDescriptor, JobGroup, NewUpload, ProjectConfig, TableSpec,
    UploadStatus,
};
use cms_store::{QualifiedTable, SourceStore, SqliteStore, Store};
use cms_transform::{ChunkReshaper, ColumnClassifier, DX_PASS, build_fact_frame, check_template};

use crate::error::{EtlError, Result};
use crate::step::EventLog;
use crate::tracker::UploadTracker;

const DEFAULT_USER: &str = "etl";

/// Summary of a finished upload job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub upload_id: i64,
    pub upload_label: String,
    pub fact_table: String,
    pub status: UploadStatus,
    pub loaded_record: i64,
    pub chunks: usize,
    pub rows_read: usize,
    pub facts_reshaped: usize,
    pub patient_misses: usize,
    /// Facts dropped because their source row has no start date.
    pub undated_facts: usize,
    pub surrogate_encounters: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct LoadTotals {
    chunks: usize,
    rows_read: usize,
    facts_reshaped: usize,
    patient_misses: usize,
    undated_facts: usize,
    surrogate_encounters: usize,
}

/// One upload job: a table, a bene_id range and the project settings.
#[derive(Debug, Clone)]
pub struct CmsRifUpload {
    config: ProjectConfig,
    table: TableSpec,
    range: BeneRange,
    group: JobGroup,
    user_id: String,
}

impl CmsRifUpload {
    pub fn new(config: ProjectConfig, table_name: &str, range: BeneRange) -> Result<Self> {
        let table = config
            .table(table_name)
            .cloned()
            .ok_or_else(|| EtlError::UnknownTable(table_name.to_string()))?;
        Ok(Self {
            config,
            table,
            range,
            group: JobGroup::default(),
            user_id: DEFAULT_USER.to_string(),
        })
    }

    pub fn with_group(mut self, group: JobGroup) -> Self {
        self.group = group;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    /// `"<Transform> #<group_num> of <group_qty>; <bene_qty> bene_ids <first>..."`.
    pub fn label(&self) -> String {
        format!(
            "{} #{} of {}; {} bene_ids {}...",
            self.table.transform_name,
            opt_num(self.group.group_num),
            opt_num(self.group.group_qty),
            opt_num(self.group.bene_qty),
            self.range.first
        )
    }

    /// `"<schema>.<table>"` of the source table.
    pub fn input_label(&self) -> String {
        self.source_table().to_string()
    }

    fn source_table(&self) -> QualifiedTable {
        QualifiedTable::new(self.config.source.schema.clone(), self.table.name.clone())
    }

    /// Opens the configured store and runs the job against it.
    pub fn run(&self) -> Result<UploadOutcome> {
        let store = open_store(&self.config)?;
        self.run_with(&store)
    }

    pub fn run_with<S: Store + ?Sized>(&self, store: &S) -> Result<UploadOutcome> {
        self.run_logged(store, &EventLog::new())
    }

    /// Runs the job, reporting steps to `log`.
    pub fn run_logged<S: Store + ?Sized>(&self, store: &S, log: &EventLog) -> Result<UploadOutcome> {
        let started = Instant::now();
        let label = self.label();
        let mut job = log.step(
            format!("upload {label}"),
            &[("transform", self.table.transform_name.clone())],
        );

        check_template(&self.config.fact_template)?;
        let mut tracker = UploadTracker::create(
            store,
            &self.config.star.schema,
            &NewUpload {
                upload_label: label.clone(),
                user_id: self.user_id.clone(),
                source_cd: self.config.source.source_cd.clone(),
                transform_name: self.table.transform_name.clone(),
            },
        )?;
        job.record("upload_id", tracker.upload_id());

        let totals = match self.load(store, &mut tracker, log) {
            Ok(totals) => totals,
            Err(err) => {
                tracker.fail(&err);
                return Err(err);
            }
        };
        let loaded_record = match tracker.complete() {
            Ok(loaded) => loaded,
            Err(err) => {
                tracker.fail(&err);
                return Err(err);
            }
        };
        job.record("loaded_record", loaded_record);
        job.finish();

        Ok(UploadOutcome {
            upload_id: tracker.upload_id(),
            upload_label: label,
            fact_table: tracker.fact_table().to_string(),
            status: tracker.status(),
            loaded_record,
            chunks: totals.chunks,
            rows_read: totals.rows_read,
            facts_reshaped: totals.facts_reshaped,
            patient_misses: totals.patient_misses,
            undated_facts: totals.undated_facts,
            surrogate_encounters: totals.surrogate_encounters,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Column descriptors for the job's source table.
    pub fn describe_columns<S: SourceStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<Vec<ColumnDescriptor>> {
        describe_columns(&self.config, &self.table.name, store)
    }

    fn load<S: Store + ?Sized>(
        &self,
        store: &S,
        tracker: &mut UploadTracker<'_, S>,
        log: &EventLog,
    ) -> Result<LoadTotals> {
        let upload_id = tracker.upload_id();
        let input = self.input_label();
        tracker.start(&self.config.fact_template)?;

        let options = ReadOptions::default()
            .with_chunk_size(self.config.etl.chunk_size)
            .with_log_plan(self.config.etl.log_plan)
            .with_bene_qty(self.group.bene_qty);
        let mut reader = ChunkReader::open(
            store,
            self.source_table(),
            &self.table.admin.bene_id,
            self.range,
            options,
        )?;
        let descriptors = ColumnClassifier::new(&self.config.etl)?
            .classify_all(reader.columns(), &self.table.admin);
        let reshaper = ChunkReshaper::new(&descriptors, &self.table.name, self.table.admin.clone())?;
        let mapper = IdentityMapper::new(&self.config.source);
        info!(
            upload_id,
            input = %input,
            dx_groups = reshaper.stacker().groups().len(),
            pivot_kinds = ?reshaper.pivoter().kinds(),
            surrogate_scheme = SURROGATE_SCHEME,
            "classified source columns"
        );

        let mut totals = LoadTotals::default();
        let mut bulk_rows = 0_usize;
        loop {
            let chunk_step = log.step(
                format!("UP#{upload_id}: ETL chunk from {input}"),
                &[("upload_id", upload_id.to_string())],
            );

            let mut select = log.step(format!("UP#{upload_id}: select from {input}"), &[]);
            let Some(chunk) = reader.next().transpose()? else {
                select.finish();
                chunk_step.finish();
                break;
            };
            select.append_message(chunk.progress.message());
            select.record("rows_in", chunk.progress.rows_in);
            select.record("subtot_in", chunk.progress.subtot_in);
            select.record("bene_subtot", chunk.progress.bene_subtot);
            let progress_message = select.message();
            select.finish();

            let mut stack = log.step(
                format!(
                    "stack diagnoses from {} {input} records",
                    chunk.data.height()
                ),
                &[],
            );
            let buffer = reshaper.reshape(&chunk.data, chunk.row_offset)?;
            stack.append_message(format!(" {} diagnoses", buffer.pass_len(DX_PASS)));
            for (pass, len) in buffer.passes() {
                stack.record(pass, len);
            }
            let undated = buffer.undated();
            if undated > 0 {
                stack.record("undated", undated);
            }
            stack.finish();

            let mut mapping = log.step(format!("mapping {} facts", buffer.len()), &[]);
            let (mapped, stats) = mapper.map(store, buffer.into_facts())?;
            mapping.append_message(stats.message());
            mapping.record("patient_misses", stats.patient_misses);
            mapping.record("surrogates", stats.surrogates);
            mapping.finish();

            let stamp = AdminStamp {
                sourcesystem_cd: self.config.source.source_cd.clone(),
                download_date: self.config.source.download_date,
                upload_id,
                import_date: store.current_timestamp()?,
            };
            let frame = build_fact_frame(&mapped, &stamp, &self.config.fact_template)?;

            let mut insert = log.step(
                format!(
                    "UP#{upload_id}: bulk insert {} rows into {}",
                    frame.height(),
                    tracker.fact_table()
                ),
                &[],
            );
            let appended = store.append_frame(tracker.fact_table(), &frame)?;
            bulk_rows += appended;
            insert.append_message(format!(" ({bulk_rows} subtotal)"));
            insert.record("subtotal", bulk_rows);
            insert.finish();

            tracker.record_chunk(appended, &progress_message)?;

            totals.chunks += 1;
            totals.rows_read = chunk.progress.subtot_in;
            totals.facts_reshaped += stats.facts_in;
            totals.patient_misses += stats.patient_misses;
            totals.undated_facts += undated;
            totals.surrogate_encounters += stats.surrogates;
            chunk_step.finish();
        }
        Ok(totals)
    }
}

/// Opens the configured database, attaches its aliases and makes sure the
/// star schema tables exist.
pub fn open_store(config: &ProjectConfig) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.database, config.star.clone())?;
    for (alias, path) in &config.attach {
        store.attach(alias, path)?;
    }
    store.init_star_schema()?;
    Ok(store)
}

/// Classifies every column of a configured source table.
pub fn describe_columns<S: SourceStore + ?Sized>(
    config: &ProjectConfig,
    table_name: &str,
    store: &S,
) -> Result<Vec<ColumnDescriptor>> {
    let spec = config
        .table(table_name)
        .ok_or_else(|| EtlError::UnknownTable(table_name.to_string()))?;
    let table = QualifiedTable::new(config.source.schema.clone(), spec.name.clone());
    let columns = store.table_columns(&table)?;
    Ok(ColumnClassifier::new(&config.etl)?.classify_all(&columns, &spec.admin))
}

fn opt_num<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-1".to_string(), |v| v.to_string())
}
