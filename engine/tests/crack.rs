//! Crack protocol scenarios: indexed lookups, batched file mode and false
//! positive handling.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use rtcrack_commons::{generate_word, HashAlgorithm, Password};
use rtcrack_engine::{
    compute_chain, BuildOpts, Engine, EngineError, TableCtx, TableType, SIMD_LANES,
};

fn hex_of(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The word fed to the hash at `column` of a chain.
fn chain_word_at(ctx: &TableCtx, chain: u64, column: usize) -> Password {
    let reducer = ctx.reducer();
    let mut word = generate_word(ctx.lower_bound() + u128::from(chain), &ctx.charset);

    for c in 0..column {
        let digest = ctx.algorithm.hash(&word);
        let mut reduced = [0u8; 16];
        let length = reducer.reduce(&mut reduced[..ctx.max], &digest, c);
        word = Password::new(&reduced[..length]);
    }
    word
}

/// Builds and endpoint-sorts a 32-chain MD5 table over three-character
/// alphanumeric words. The keyspace is sparse enough that chains rarely
/// merge.
fn sorted_table(path: &Path) -> Engine {
    let builder = TableCtx::builder()
        .algorithm(HashAlgorithm::Md5)
        .min(3)
        .max(3)
        .chain_length(8)
        .charset(b"abcdefghijklmnopqrstuvwxyz0123456789")
        .table_type(TableType::Uncompressed);

    let mut engine = Engine::create(path, builder).unwrap();
    let opts = BuildOpts {
        blocksize: SIMD_LANES,
        count: 32,
        threads: 2,
    };
    engine.build(&opts, None).unwrap();
    engine.sort_table().unwrap();
    engine
}

/// Chains whose endpoint bytes occur exactly once in the table. Targeting
/// those makes recovery deterministic: the lookup cannot land on a merged
/// twin whose replay misses the target.
fn unique_endpoint_chains(path: &Path, count: u64) -> Vec<u64> {
    let chains: Vec<_> = (0..count)
        .map(|i| rtcrack_engine::get_chain(path, i).unwrap())
        .collect();

    chains
        .iter()
        .filter(|chain| chains.iter().filter(|c| c.end == chain.end).count() == 1)
        .map(|chain| chain.index)
        .collect()
}

#[test]
fn test_indexed_crack_recovers_mid_chain_words() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sorted.rt");
    let mut engine = sorted_table(&path);
    let ctx = engine.ctx().clone();

    let unique = unique_endpoint_chains(&path, 32);
    assert!(unique.len() >= 3, "test table lost too many chains to merges");

    let columns = ctx.chain_length as usize;
    for (&chain, column) in unique.iter().zip([0, 3, columns - 1]) {
        let word = chain_word_at(&ctx, chain, column);
        let digest = ctx.algorithm.hash(&word);

        let report = engine.crack(&hex_of(&digest), 1, None).unwrap();
        assert_eq!(
            vec![(hex_of(&digest), word.to_string())],
            report.found,
            "chain {chain} column {column}"
        );
    }
}

#[test]
fn test_crack_misses_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sorted.rt");
    let mut engine = sorted_table(&path);

    // a digest of a word outside the keyspace
    let digest = HashAlgorithm::Md5.hash(b"outside");
    let report = engine.crack(&hex_of(&digest), 1, None).unwrap();
    assert!(report.found.is_empty());
}

#[test]
fn test_crack_file_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sorted.rt");
    let mut engine = sorted_table(&path);
    let ctx = engine.ctx().clone();

    let unique = unique_endpoint_chains(&path, 32);
    assert!(unique.len() >= 3, "test table lost too many chains to merges");

    let known: Vec<String> = unique[..3]
        .iter()
        .zip([1usize, 4, 7])
        .map(|(&chain, column)| {
            let word = chain_word_at(&ctx, chain, column);
            hex_of(&ctx.algorithm.hash(&word))
        })
        .collect();

    let targets = dir.path().join("hashes.txt");
    let mut file = std::fs::File::create(&targets).unwrap();
    for digest in &known {
        writeln!(file, "{digest}").unwrap();
    }
    writeln!(file, "{}", hex_of(&HashAlgorithm::Md5.hash(b"missing"))).unwrap();
    writeln!(file, "not a digest at all").unwrap();
    drop(file);

    let report = engine
        .crack(targets.to_str().unwrap(), 2, None)
        .unwrap();

    assert_eq!(3, report.found.len());
    for digest in &known {
        let hit = report.found.iter().find(|(d, _)| d == digest).unwrap();
        assert_eq!(*digest, hex_of(&ctx.algorithm.hash(hit.1.as_bytes())));
    }
}

#[test]
fn test_invalid_target_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sorted.rt");
    let mut engine = sorted_table(&path);

    let result = engine.crack("definitely-not-a-digest", 1, None);
    assert!(matches!(result, Err(EngineError::InvalidTarget(_))));
}

#[test]
fn test_false_positive_is_counted_not_emitted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("synthetic.rt");

    let ctx = TableCtx::builder()
        .algorithm(HashAlgorithm::Sha1)
        .min(2)
        .max(2)
        .chain_length(2)
        .charset(b"abcd")
        .table_type(TableType::Uncompressed)
        .build()
        .unwrap();

    let reducer = ctx.reducer();
    let target = ctx.algorithm.hash(b"aa");
    let genuine = compute_chain(0, &ctx); // the chain starting at "aa"

    // the word the crack walk probes at the last column: any row carrying
    // it as its endpoint gets validated
    let mut probe = [0u8; 2];
    let probe_len = reducer.reduce(&mut probe, &target, 1);
    let decoy_endpoint = Password::new(&probe[..probe_len]);
    assert_ne!(
        genuine.end, decoy_endpoint,
        "decoy construction needs a distinct endpoint"
    );

    // a chain that never hashes to the target, mislabelled with the probed
    // endpoint
    let decoy_index = (1..16)
        .find(|&index| {
            (0..=1).all(|column| {
                let word = chain_word_at(&ctx, index, column);
                ctx.algorithm.hash(&word).as_slice() != target.as_slice()
            })
        })
        .expect("some chain avoids the target digest");

    let header = rtcrack_engine::TableHeader {
        table_type: TableType::Uncompressed,
        algorithm: ctx.algorithm,
        min: 2,
        max: 2,
        chain_length: 2,
        charset: ctx.charset.clone(),
    };
    header.store(&path).unwrap();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    let mut row = |index: u64, endpoint: &Password| {
        file.write_all(&index.to_le_bytes()).unwrap();
        file.write_all(endpoint).unwrap();
    };
    row(decoy_index, &decoy_endpoint); // scanned first
    row(0, &genuine.end);
    drop(file);

    let mut engine = Engine::open(&path).unwrap();
    let report = engine.crack(&hex_of(&target), 1, None).unwrap();

    assert_eq!(vec![(hex_of(&target), "aa".to_string())], report.found);
    assert!(report.false_positives >= 1);
}
