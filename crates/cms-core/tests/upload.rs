//! End-to-end upload jobs against an in-memory SQLite store.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::DataFrame;

use cms_core::{CmsRifUpload, EtlError, EventLog, StepOutcome, describe_columns};
use cms_map::surrogate_encounter_num;
use cms_model::{
    AdminColumns, BeneRange, EtlSettings, FactTableTemplate, JobGroup, NewUpload, ProjectConfig,
    SourceColumn, SourceSettings, StarSettings, TableSpec, UploadRecord, UploadStatus, ValueKind,
};
use cms_store::{
    FactStore, IdentityRow, IdentityStore, QualifiedTable, RangeScan, SourceStore, SqliteStore,
    StatusStore, StoreError,
};

const CLAIMS: &str = "
CREATE TABLE bcarrier_claims (
    bene_id VARCHAR(15),
    clm_id VARCHAR(15),
    clm_from_dt DATE,
    clm_thru_dt DATE,
    nch_wkly_proc_dt DATE,
    prncpal_dgns_cd VARCHAR(7),
    prncpal_dgns_vrsn_cd VARCHAR(1),
    icd_dgns_cd1 VARCHAR(7),
    icd_dgns_vrsn_cd1 VARCHAR(1),
    sex VARCHAR(1),
    clm_pmt_amt NUMERIC(12,2),
    line_1st_expns_dt DATE
);
INSERT INTO bcarrier_claims VALUES
    ('1', 'c1', '2015-01-01', '2015-01-03', '2015-01-09', '25000', '9', NULL, NULL, '1', 10.5, '2014-12-30'),
    ('2', 'c2', '2015-02-01', '2015-02-01', NULL, 'V5789', NULL, '4019', '9', '2', NULL, NULL),
    ('30', 'c30', '2015-02-01', '2015-02-01', NULL, '4011', '9', NULL, NULL, '2', 1, NULL),
    ('3', 'c3', '2015-03-01', '2015-03-02', NULL, '4011', '9', NULL, NULL, '1', 3, NULL),
    ('4', 'c4', '2015-04-01', '2015-04-01', NULL, '4011', '9', NULL, NULL, '2', 1, NULL);
INSERT INTO patient_mapping (patient_ide, patient_ide_source, patient_num) VALUES
    ('1', 'ccwdata.org(BENE_ID)', 101),
    ('2', 'ccwdata.org(BENE_ID)', 102),
    ('3', 'ccwdata.org(BENE_ID)', 103),
    ('30', 'ccwdata.org(BENE_ID)', 130);
";

/// Facts expected from bene_ids 1..=3; bene 4 has no patient mapping.
const EXPECTED_FACTS: i64 = 13;

fn config() -> ProjectConfig {
    ProjectConfig {
        database: PathBuf::from(":memory:"),
        attach: BTreeMap::new(),
        source: SourceSettings {
            schema: "main".to_string(),
            source_cd: "ccwdata.org".to_string(),
            download_date: NaiveDate::from_ymd_opt(2017, 1, 1),
        },
        star: StarSettings::default(),
        etl: EtlSettings {
            chunk_size: 2,
            log_plan: true,
            ..EtlSettings::default()
        },
        fact_template: FactTableTemplate::i2b2(),
        tables: vec![
            TableSpec {
                name: "bcarrier_claims".to_string(),
                transform_name: "CarrierClaimUpload".to_string(),
                admin: AdminColumns::default(),
            },
            TableSpec {
                name: "missing_claims".to_string(),
                transform_name: "MissingUpload".to_string(),
                admin: AdminColumns::default(),
            },
        ],
    }
}

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory(StarSettings::default()).unwrap();
    store.init_star_schema().unwrap();
    store.connection().execute_batch(CLAIMS).unwrap();
    store
}

fn job(first: i64, last: i64) -> CmsRifUpload {
    CmsRifUpload::new(config(), "bcarrier_claims", BeneRange::new(first, last).unwrap())
        .unwrap()
        .with_group(JobGroup {
            bene_qty: Some(4),
            group_num: Some(1),
            group_qty: Some(3),
        })
        .with_user("tester")
}

fn upload_row(store: &SqliteStore, upload_id: i64) -> UploadRecord {
    store.upload(upload_id).unwrap().unwrap()
}

#[test]
fn label_and_input_label() {
    let job = job(1, 5);
    assert_eq!(job.label(), "CarrierClaimUpload #1 of 3; 4 bene_ids 1...");
    assert_eq!(job.input_label(), "main.bcarrier_claims");

    let bare = CmsRifUpload::new(config(), "BCARRIER_CLAIMS", BeneRange::new(7, 9).unwrap())
        .unwrap();
    assert_eq!(bare.label(), "CarrierClaimUpload #-1 of -1; -1 bene_ids 7...");
}

#[test]
fn describes_source_columns() {
    let store = store();
    let columns = describe_columns(&config(), "bcarrier_claims", &store).unwrap();
    let kind = |name: &str| {
        columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| (c.value_kind, c.is_dx))
            .unwrap()
    };
    assert_eq!(columns.len(), 12);
    assert_eq!(kind("bene_id"), (ValueKind::Untyped, false));
    assert_eq!(kind("clm_from_dt"), (ValueKind::Untyped, false));
    assert_eq!(kind("sex"), (ValueKind::Coded, false));
    assert_eq!(kind("clm_id"), (ValueKind::Text, false));
    assert_eq!(kind("clm_pmt_amt"), (ValueKind::Numeric, false));
    assert_eq!(kind("line_1st_expns_dt"), (ValueKind::Date, false));
    assert_eq!(kind("prncpal_dgns_cd"), (ValueKind::Coded, true));

    let err = describe_columns(&config(), "missing_claims", &store).unwrap_err();
    assert!(matches!(err, EtlError::Store(_)));
}

#[test]
fn unknown_table_is_rejected() {
    let err = CmsRifUpload::new(config(), "nope", BeneRange::new(1, 2).unwrap()).unwrap_err();
    assert!(matches!(err, EtlError::UnknownTable(name) if name == "nope"));
}

#[test]
fn loads_range_into_a_completed_upload() {
    let store = store();
    let log = EventLog::recording();
    let outcome = job(1, 5).run_logged(&store, &log).unwrap();

    assert_eq!(outcome.status, UploadStatus::Completed);
    assert_eq!(outcome.loaded_record, EXPECTED_FACTS);
    assert_eq!(outcome.chunks, 2);
    assert_eq!(outcome.rows_read, 4);
    assert_eq!(outcome.patient_misses, 4);
    assert_eq!(outcome.fact_table, "main.observation_fact_1");

    let table = QualifiedTable::new("main", "observation_fact_1");
    assert_eq!(store.row_count(&table).unwrap() as i64, EXPECTED_FACTS);

    let row = upload_row(&store, outcome.upload_id);
    assert_eq!(row.load_status, UploadStatus::Completed);
    assert_eq!(row.loaded_record, Some(EXPECTED_FACTS));
    assert_eq!(row.user_id, "tester");
    assert_eq!(row.transform_name, "CarrierClaimUpload");
    assert!(
        row.message
            .as_deref()
            .unwrap()
            .starts_with("UP#1: select from main.bcarrier_claims + 2 rows = 4 for 4")
    );

    let records = log.records();
    assert!(records.iter().all(|r| r.outcome == StepOutcome::Completed));
    let upload_step = records.last().unwrap();
    assert_eq!(upload_step.path, vec![1]);
    assert_eq!(upload_step.context_value("loaded_record"), Some("13"));
    assert!(records.iter().any(|r| r.message.ends_with(" (13 subtotal)")));
}

#[test]
fn facts_carry_expected_codes_and_admin_columns() {
    let store = store();
    job(1, 5).run_with(&store).unwrap();
    let conn = store.connection();

    let (modifier, instance, start): (String, i64, String) = conn
        .query_row(
            "SELECT modifier_cd, instance_num, start_date FROM observation_fact_1
             WHERE concept_cd = 'ICD9:250.00'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(modifier, "1");
    assert_eq!(instance, 0);
    assert_eq!(start, "2015-01-01");

    let secondary: String = conn
        .query_row(
            "SELECT modifier_cd FROM observation_fact_1 WHERE concept_cd = 'ICD9:401.9'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(secondary, "CMS_RIF:BCARRIER_CLAIMS");

    let sex_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM observation_fact_1 WHERE concept_cd = 'SEX:1' AND valtype_cd = '@'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(sex_count, 2);

    let (source, upload_id, download, provider): (String, i64, String, String) = conn
        .query_row(
            "SELECT DISTINCT sourcesystem_cd, upload_id, download_date, provider_id
             FROM observation_fact_1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(source, "ccwdata.org");
    assert_eq!(upload_id, 1);
    assert_eq!(download, "2017-01-01");
    assert_eq!(provider, "@");

    let import_date: String = conn
        .query_row("SELECT MIN(import_date) FROM observation_fact_1", [], |row| row.get(0))
        .unwrap();
    assert!(NaiveDateTime::parse_from_str(&import_date, "%Y-%m-%d %H:%M:%S%.f").is_ok());
}

#[test]
fn date_facts_are_self_dated() {
    let store = store();
    job(1, 5).run_with(&store).unwrap();
    let (tval, start, end, valtype): (String, String, String, String) = store
        .connection()
        .query_row(
            "SELECT tval_char, start_date, end_date, valtype_cd FROM observation_fact_1
             WHERE concept_cd = 'LINE_1ST_EXPNS_DT:'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(tval, "2014-12-30");
    assert_eq!(start, "2014-12-30");
    assert_eq!(end, "2014-12-30");
    assert_eq!(valtype, "d");
}

#[test]
fn surrogate_encounters_are_deterministic() {
    let store = store();
    job(1, 5).run_with(&store).unwrap();
    job(1, 5).run_with(&store).unwrap();

    let keys = |table: &str| -> Vec<(String, i64, i64)> {
        let mut stmt = store
            .connection()
            .prepare(&format!(
                "SELECT concept_cd, instance_num, encounter_num FROM {table}
                 ORDER BY concept_cd, instance_num"
            ))
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    };
    let first = keys("observation_fact_1");
    assert_eq!(first, keys("observation_fact_2"));
    assert!(first.iter().all(|(_, _, enc)| *enc < 0));

    let expected = surrogate_encounter_num(NaiveDate::from_ymd_opt(2015, 1, 1), "1");
    let primary = first
        .iter()
        .find(|(concept, _, _)| concept == "ICD9:250.00")
        .unwrap();
    assert_eq!(primary.2, expected);
}

#[test]
fn empty_range_completes_with_zero() {
    let store = store();
    let outcome = job(100, 200).run_with(&store).unwrap();
    assert_eq!(outcome.status, UploadStatus::Completed);
    assert_eq!(outcome.loaded_record, 0);
    assert_eq!(outcome.chunks, 0);

    let row = upload_row(&store, outcome.upload_id);
    assert_eq!(row.load_status, UploadStatus::Completed);
    assert_eq!(row.loaded_record, Some(0));
    let table = QualifiedTable::new("main", "observation_fact_1");
    assert_eq!(store.row_count(&table).unwrap(), 0);
}

#[test]
fn failure_marks_the_upload_failed() {
    let store = store();
    let log = EventLog::recording();
    let err = CmsRifUpload::new(config(), "missing_claims", BeneRange::new(1, 5).unwrap())
        .unwrap()
        .run_logged(&store, &log)
        .unwrap_err();
    assert!(matches!(err, EtlError::Store(_)));

    let row = upload_row(&store, 1);
    assert_eq!(row.load_status, UploadStatus::Failed);
    assert!(row.message.as_deref().unwrap().contains("missing_claims"));
    assert_eq!(row.loaded_record, None);

    let records = log.records();
    assert_eq!(records.last().unwrap().outcome, StepOutcome::Failed);
}

#[test]
fn incompatible_template_is_a_schema_mismatch() {
    let store = store();
    let mut config = config();
    config.fact_template.columns.retain(|c| c.name != "concept_cd");
    let err = CmsRifUpload::new(config, "bcarrier_claims", BeneRange::new(1, 5).unwrap())
        .unwrap()
        .run_with(&store)
        .unwrap_err();
    assert!(matches!(err, EtlError::SchemaMismatch { .. }));
    assert!(store.upload(1).unwrap().is_none());
}

/// Delegates to SQLite, capturing each progress write together with the
/// fact table size at that moment. With `fail_progress` set, every
/// progress write is rejected.
struct ProgressSpy<'a> {
    inner: &'a SqliteStore,
    writes: RefCell<Vec<(i64, usize)>>,
    fail_progress: bool,
}

impl<'a> ProgressSpy<'a> {
    fn new(inner: &'a SqliteStore) -> Self {
        Self {
            inner,
            writes: RefCell::new(Vec::new()),
            fail_progress: false,
        }
    }
}

impl SourceStore for ProgressSpy<'_> {
    fn table_columns(&self, table: &QualifiedTable) -> cms_store::Result<Vec<SourceColumn>> {
        self.inner.table_columns(table)
    }

    fn explain_scan(
        &self,
        scan: &RangeScan,
        columns: &[SourceColumn],
    ) -> cms_store::Result<Vec<String>> {
        self.inner.explain_scan(scan, columns)
    }

    fn next_chunk(
        &self,
        scan: &mut RangeScan,
        columns: &[SourceColumn],
        limit: usize,
    ) -> cms_store::Result<Option<DataFrame>> {
        self.inner.next_chunk(scan, columns, limit)
    }
}

impl IdentityStore for ProgressSpy<'_> {
    fn patient_mapping(
        &self,
        ide_source: &str,
        first: &str,
        last: &str,
    ) -> cms_store::Result<Vec<IdentityRow>> {
        self.inner.patient_mapping(ide_source, first, last)
    }

    fn encounter_mapping(
        &self,
        ide_source: &str,
        first: &str,
        last: &str,
    ) -> cms_store::Result<Vec<IdentityRow>> {
        self.inner.encounter_mapping(ide_source, first, last)
    }
}

impl FactStore for ProgressSpy<'_> {
    fn current_timestamp(&self) -> cms_store::Result<NaiveDateTime> {
        self.inner.current_timestamp()
    }

    fn create_fact_table(
        &self,
        table: &QualifiedTable,
        template: &FactTableTemplate,
    ) -> cms_store::Result<()> {
        self.inner.create_fact_table(table, template)
    }

    fn append_frame(&self, table: &QualifiedTable, frame: &DataFrame) -> cms_store::Result<usize> {
        self.inner.append_frame(table, frame)
    }

    fn row_count(&self, table: &QualifiedTable) -> cms_store::Result<usize> {
        self.inner.row_count(table)
    }
}

impl StatusStore for ProgressSpy<'_> {
    fn insert_upload(&self, upload: &NewUpload) -> cms_store::Result<i64> {
        self.inner.insert_upload(upload)
    }

    fn update_progress(
        &self,
        upload_id: i64,
        loaded_record: i64,
        message: &str,
    ) -> cms_store::Result<()> {
        let table = QualifiedTable::new("main", FactTableTemplate::table_name(upload_id));
        let committed = self.inner.row_count(&table)?;
        self.writes.borrow_mut().push((loaded_record, committed));
        if self.fail_progress {
            return Err(StoreError::InvalidValue {
                column: "loaded_record".to_string(),
                value: loaded_record.to_string(),
            });
        }
        self.inner.update_progress(upload_id, loaded_record, message)
    }

    fn set_status(
        &self,
        upload_id: i64,
        status: UploadStatus,
        message: Option<&str>,
    ) -> cms_store::Result<()> {
        self.inner.set_status(upload_id, status, message)
    }

    fn upload(&self, upload_id: i64) -> cms_store::Result<Option<UploadRecord>> {
        self.inner.upload(upload_id)
    }
}

#[test]
fn progress_is_monotonic_and_never_ahead_of_the_fact_table() {
    let store = store();
    let spy = ProgressSpy::new(&store);
    let outcome = job(1, 5).run_with(&spy).unwrap();

    let writes = spy.writes.into_inner();
    // one write per chunk, then the final count
    assert_eq!(writes.len(), 3);
    for (loaded, committed) in &writes {
        assert_eq!(*loaded, *committed as i64);
    }
    assert!(writes.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(writes.last().unwrap().0, outcome.loaded_record);
}

#[test]
fn failed_completion_write_marks_the_upload_failed() {
    let store = store();
    let spy = ProgressSpy {
        fail_progress: true,
        ..ProgressSpy::new(&store)
    };
    let err = job(100, 200).run_with(&spy).unwrap_err();
    assert!(matches!(err, EtlError::Store(StoreError::InvalidValue { .. })));

    let row = upload_row(&store, 1);
    assert_eq!(row.load_status, UploadStatus::Failed);
    assert!(row.message.as_deref().unwrap().contains("loaded_record"));
}

#[test]
fn rows_without_a_claim_date_are_counted_not_loaded() {
    let store = store();
    store
        .connection()
        .execute_batch(
            "INSERT INTO bcarrier_claims VALUES
                 ('5', 'c5', NULL, '2015-05-01', NULL, '4011', '9', NULL, NULL, '1', 2, '2015-04-28');
             INSERT INTO patient_mapping (patient_ide, patient_ide_source, patient_num) VALUES
                 ('5', 'ccwdata.org(BENE_ID)', 105);",
        )
        .unwrap();

    let outcome = job(5, 5).run_with(&store).unwrap();
    assert_eq!(outcome.status, UploadStatus::Completed);
    assert_eq!(outcome.rows_read, 1);
    // dx, clm_id, sex and payment; the expense date is self-dated and loads
    assert_eq!(outcome.undated_facts, 4);
    assert_eq!(outcome.patient_misses, 0);
    assert_eq!(outcome.loaded_record, 1);

    let concept: String = store
        .connection()
        .query_row("SELECT concept_cd FROM observation_fact_1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(concept, "LINE_1ST_EXPNS_DT:");

    let row = upload_row(&store, outcome.upload_id);
    assert_eq!(row.load_status, UploadStatus::Completed);
    assert_eq!(row.loaded_record, Some(1));
}
