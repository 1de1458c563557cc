//! Chunk reader tests against an in-memory SQLite store.

use cms_ingest::{ChunkReader, IngestError, ReadOptions};
use cms_model::{BeneRange, StarSettings};
use cms_store::{QualifiedTable, SqliteStore};

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory(StarSettings::default()).unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TABLE bcarrier_claims (bene_id VARCHAR(15), clm_id VARCHAR(15), hcpcs_cd VARCHAR(5));
             INSERT INTO bcarrier_claims VALUES ('1', 'a', '99213');
             INSERT INTO bcarrier_claims VALUES ('2', 'b', '99214');
             INSERT INTO bcarrier_claims VALUES ('2', 'c', NULL);
             INSERT INTO bcarrier_claims VALUES ('3', 'd', '99213');
             INSERT INTO bcarrier_claims VALUES ('9', 'e', '99215');
             INSERT INTO bcarrier_claims VALUES ('4', 'f', '99213');",
        )
        .unwrap();
    store
}

fn table() -> QualifiedTable {
    QualifiedTable::new("main", "bcarrier_claims")
}

#[test]
fn reads_range_in_bounded_chunks_with_running_totals() {
    let store = store();
    let options = ReadOptions::default()
        .with_chunk_size(2)
        .with_bene_qty(Some(4))
        .with_log_plan(true);
    let reader = ChunkReader::open(&store, table(), "BENE_ID", BeneRange::new(1, 4).unwrap(), options)
        .unwrap();
    assert_eq!(reader.columns().len(), 3);

    let chunks: Vec<_> = reader.map(Result::unwrap).collect();
    let sizes: Vec<usize> = chunks.iter().map(|c| c.data.height()).collect();
    assert_eq!(sizes, [2, 2, 1]);

    let offsets: Vec<usize> = chunks.iter().map(|c| c.row_offset).collect();
    assert_eq!(offsets, [0, 2, 4]);

    let last = chunks.last().unwrap().progress;
    assert_eq!(last.subtot_in, 5);
    assert_eq!(last.bene_subtot, 4);
    assert_eq!(last.bene_pct(), Some(100.0));
    assert_eq!(chunks[0].progress.bene_subtot, 2);
    assert_eq!(chunks[1].progress.message(), " + 2 rows = 4 for 3 (75.00%) of 4 bene_ids");
}

#[test]
fn exact_multiple_of_chunk_size_ends_cleanly() {
    let store = store();
    let reader = ChunkReader::open(
        &store,
        table(),
        "bene_id",
        BeneRange::new(2, 3).unwrap(),
        ReadOptions::default().with_chunk_size(3),
    )
    .unwrap();
    let chunks: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].data.height(), 3);
}

#[test]
fn empty_range_yields_nothing() {
    let store = store();
    let mut reader = ChunkReader::open(
        &store,
        table(),
        "bene_id",
        BeneRange::new(100, 200).unwrap(),
        ReadOptions::default(),
    )
    .unwrap();
    assert!(reader.next().is_none());
    assert!(reader.next().is_none());
    assert_eq!(reader.rows_read(), 0);
}

#[test]
fn missing_bene_id_column_is_reported() {
    let store = store();
    let err = ChunkReader::open(
        &store,
        table(),
        "patient",
        BeneRange::new(1, 2).unwrap(),
        ReadOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, IngestError::MissingColumn { column, .. } if column == "patient"));
}

#[test]
fn reader_stops_after_an_error() {
    let store = store();
    let mut reader = ChunkReader::open(
        &store,
        table(),
        "bene_id",
        BeneRange::new(1, 4).unwrap(),
        ReadOptions::default(),
    )
    .unwrap();
    store
        .connection()
        .execute_batch("DROP TABLE bcarrier_claims")
        .unwrap();
    assert!(matches!(reader.next(), Some(Err(_))));
    assert!(reader.next().is_none());
}

#[test]
fn padded_and_blank_bene_ids_count_like_reshaping() {
    let store = SqliteStore::open_in_memory(StarSettings::default()).unwrap();
    store
        .connection()
        .execute_batch(
            "CREATE TABLE bcarrier_claims (bene_id VARCHAR(15), clm_id VARCHAR(15));
             INSERT INTO bcarrier_claims VALUES ('2', 'a');
             INSERT INTO bcarrier_claims VALUES (' 2 ', 'b');
             INSERT INTO bcarrier_claims VALUES ('', 'c');
             INSERT INTO bcarrier_claims VALUES ('3', 'd');",
        )
        .unwrap();
    let reader = ChunkReader::open(
        &store,
        table(),
        "bene_id",
        BeneRange::new(0, 5).unwrap(),
        ReadOptions::default().with_chunk_size(10),
    )
    .unwrap();

    let chunks: Vec<_> = reader.map(Result::unwrap).collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].progress.subtot_in, 4);
    // "2" and " 2 " are one beneficiary; the blank id is no beneficiary
    assert_eq!(chunks[0].progress.bene_subtot, 2);
}
