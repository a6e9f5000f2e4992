// Journaling comparison demo
//
// Builds two identical disks, one with journaling and one without, damages
// both the same way and prints what the integrity checker and the journal
// recovery pass report for each.

use clap::Parser;
use jfsim::{
    BlockStore, CrashSimulator, DiskConfig, FsConfig, IntegrityChecker, IntegrityReport,
    JournalingFileSystem, JfsResult,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare crash recovery with and without journaling")]
struct Args {
    /// Disk size in MB
    #[arg(long, default_value_t = 2)]
    size_mb: usize,
    /// Block size in KB
    #[arg(long, default_value_t = 4)]
    block_size_kb: usize,
    /// Corruption level passed to the crash injector
    #[arg(long, default_value_t = 0.3)]
    corruption: f64,
    /// Seed for the crash injector
    #[arg(long, default_value_t = 2024)]
    seed: u64,
    /// Print the integrity reports as JSON
    #[arg(long)]
    json: bool,
}

const FILE_SIZES: [usize; 4] = [4000, 6000, 3000, 5000];

fn scenario(args: &Args, journal_enabled: bool) -> JfsResult<JournalingFileSystem> {
    let store = BlockStore::new(DiskConfig {
        size_mb: args.size_mb,
        block_size_kb: args.block_size_kb,
    })?
    .shared();
    let mut fs = JournalingFileSystem::new(
        store,
        FsConfig {
            journal_enabled,
            ..FsConfig::default()
        },
    );
    for (i, size) in FILE_SIZES.iter().enumerate() {
        let data: Vec<u8> = format!("Test file {} with important data ", i)
            .bytes()
            .cycle()
            .take(*size)
            .collect();
        fs.create_file(&format!("test_{}.dat", i), &data)?;
    }
    for i in 0..2 {
        let data = format!("Critical data {} ", i).repeat(100);
        fs.create_file(&format!("critical_{}.dat", i), data.as_bytes())?;
    }
    Ok(fs)
}

fn check(fs: &JournalingFileSystem) -> IntegrityReport {
    let store = fs.store().lock();
    IntegrityChecker::new(&store).comprehensive_check()
}

fn run(args: &Args, journal_enabled: bool) -> JfsResult<f64> {
    let label = if journal_enabled { "WITH JOURNALING" } else { "WITHOUT JOURNALING" };
    println!("\n{}", label);
    println!("{}", "-".repeat(50));

    let mut fs = scenario(args, journal_enabled)?;
    let before = check(&fs);
    println!(
        "initial state: {}/{} files intact, {} journal entries",
        before.inodes_integrity_ok,
        before.inodes_checked,
        fs.journal().len()
    );

    let mut sim = CrashSimulator::with_seed(&mut fs, args.seed);
    let hit = sim.simulate_crash(args.corruption);
    let affected = sim.crash_points().last().map_or(0, |p| p.affected_inodes.len());
    println!("crash corrupted blocks {:?}, {} files affected", hit, affected);

    let controlled_txn = sim.controlled_crash_during_operation("critical_operation.dat")?;
    println!("controlled crash interrupted transaction {}", controlled_txn);

    let recovery = fs.recover_from_journal();
    let after = check(&fs);
    let cmp = IntegrityChecker::compare_states(&before, &after);

    println!("files intact after crash: {}", after.inodes_integrity_ok);
    println!("files lost:               {}", cmp.files_lost);
    println!("recovery rate:            {:.1}%", cmp.recovery_rate);
    println!("journal operations verified: {}", recovery.recovered);
    for pending in &recovery.pending {
        println!(
            "  pending create '{}' (transaction {})",
            pending.filename, pending.transaction_id
        );
    }
    for file in &after.corrupted_files {
        println!("  inode {}: {:?}", file.inode_id, file.status);
    }
    if args.json {
        match after.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("failed to serialize report: {}", e),
        }
    }
    Ok(cmp.recovery_rate)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("{}", "=".repeat(70));
    println!("Journaling comparison");
    println!("{}", "=".repeat(70));

    let results = run(&args, false).and_then(|without| Ok((without, run(&args, true)?)));
    match results {
        Ok((without, with)) => {
            println!("\nFINAL COMPARISON");
            println!("{}", "=".repeat(50));
            println!("without journaling: {:.1}% recovered", without);
            println!("with journaling:    {:.1}% recovered", with);
            println!(
                "the journal does not restore damaged blocks; it reports which creates never committed"
            );
        }
        Err(e) => {
            eprintln!("demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
