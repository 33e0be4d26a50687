//! Layout conversion invariants.

use rtcrack_commons::HashAlgorithm;
use rtcrack_engine::{
    get_chain, BuildOpts, Engine, TableCtx, TableMap, TableType, HEADER_SIZE, SIMD_LANES,
};

fn built_table(path: &std::path::Path, table_type: TableType) -> Engine {
    let builder = TableCtx::builder()
        .algorithm(HashAlgorithm::Md5)
        .min(1)
        .max(5)
        .chain_length(6)
        .charset(b"abcdef")
        .table_type(table_type);

    let mut engine = Engine::create(path, builder).unwrap();
    let opts = BuildOpts {
        blocksize: SIMD_LANES,
        count: 32,
        threads: 2,
    };
    engine.build(&opts, None).unwrap();
    engine
}

#[test]
fn test_compress_drops_startpoints() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.rt");
    let compressed = dir.path().join("table.rtc");

    let mut engine = built_table(&source, TableType::Uncompressed);
    let originals: Vec<_> = (0..32).map(|i| get_chain(&source, i).unwrap()).collect();

    engine.change_type(&compressed, TableType::Compressed).unwrap();

    let map = TableMap::open(&compressed).unwrap();
    assert_eq!(TableType::Compressed, map.header().table_type);
    assert_eq!(32, map.count());
    drop(map);

    let size = std::fs::metadata(&compressed).unwrap().len();
    assert_eq!(HEADER_SIZE as u64 + 32 * 5, size);

    // compressed rows sit in chain order, the row position is the index
    for (i, original) in originals.iter().enumerate() {
        let chain = get_chain(&compressed, i as u64).unwrap();
        assert_eq!(*original, chain);
    }
}

#[test]
fn test_decompress_restores_sorted_rows() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.rt");
    let compressed = dir.path().join("table.rtc");
    let restored = dir.path().join("restored.rt");

    let mut engine = built_table(&source, TableType::Uncompressed);
    let originals: Vec<_> = (0..32).map(|i| get_chain(&source, i).unwrap()).collect();

    engine.change_type(&compressed, TableType::Compressed).unwrap();
    let mut compressed_engine = Engine::open(&compressed).unwrap();
    compressed_engine
        .change_type(&restored, TableType::Uncompressed)
        .unwrap();

    let map = TableMap::open(&restored).unwrap();
    assert_eq!(TableType::Uncompressed, map.header().table_type);
    assert_eq!(32, map.count());

    // endpoint-sorted, as the binary search lookup requires
    for row in 1..map.count() {
        assert!(map.endpoint_at(row - 1) <= map.endpoint_at(row));
    }
    drop(map);

    // same chains, repackaged
    let mut restored_chains: Vec<_> = (0..32).map(|i| get_chain(&restored, i).unwrap()).collect();
    restored_chains.sort_by_key(|chain| chain.index);
    assert_eq!(originals, restored_chains);

    // and the restored table cracks through the endpoint index; target a
    // chain whose endpoint survived unmerged so the lookup is unambiguous
    let ctx = Engine::open(&restored).unwrap().ctx().clone();
    let target = originals
        .iter()
        .find(|chain| originals.iter().filter(|c| c.end == chain.end).count() == 1)
        .expect("a chain with a unique endpoint");
    let digest = ctx.algorithm.hash(&target.start);
    let digest_hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    let mut engine = Engine::open(&restored).unwrap();
    let report = engine.crack(&digest_hex, 1, None).unwrap();
    assert_eq!(vec![(digest_hex, target.start.to_string())], report.found);
}

#[test]
fn test_sort_startpoints_restores_chain_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.rt");

    let mut engine = built_table(&path, TableType::Uncompressed);
    engine.sort_table().unwrap();
    engine.sort_startpoints().unwrap();

    for index in 0..32 {
        assert_eq!(index, get_chain(&path, index).unwrap().index);
    }
}

#[test]
fn test_compressed_tables_cannot_be_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.rtc");

    let mut engine = built_table(&path, TableType::Compressed);
    assert!(engine.sort_table().is_err());
    assert!(engine.sort_startpoints().is_err());
}

#[test]
fn test_change_type_rejects_same_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.rt");
    let destination = dir.path().join("copy.rt");

    let mut engine = built_table(&path, TableType::Uncompressed);
    assert!(engine
        .change_type(&destination, TableType::Uncompressed)
        .is_err());
}
