// CLI commands

use crate::access::{AccessPolicy, Action, Role, StaticPolicy};
use crate::chain::Chain;
use crate::config::LedgerConfig;
use crate::core::{unix_now, Block, NewRecord, PayloadKey, Transaction, MAX_TRANSACTIONS};
use crate::error::{LedgerError, Result};
use crate::keystore;
use crate::storage::Storage;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const SHELL_PROMPT: &str = "medblockchain> ";

#[derive(Parser)]
#[command(name = "med-ledger")]
#[command(about = "Encrypted medical record ledger", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command; each one overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Ledger data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Payload key file
    #[arg(long, global = true)]
    pub key_file: Option<PathBuf>,

    /// Acting role (admin, doctor, nurse, read-only)
    #[arg(long, global = true)]
    pub role: Option<Role>,

    /// Leading zero hex digits required by new chains
    #[arg(long, global = true)]
    pub difficulty: Option<u32>,
}

impl GlobalOptions {
    /// Build the effective config: file (or defaults), then flags
    pub fn resolve(&self) -> Result<LedgerConfig> {
        let mut config = match &self.config {
            Some(path) => LedgerConfig::from_file(path)?,
            None => LedgerConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(key_file) = &self.key_file {
            config.key_file = Some(key_file.clone());
        }
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new ledger with a mined genesis block
    Init,

    /// Generate a new payload key file
    Keygen,

    /// Add a medical record to the pending block
    Add {
        /// Patient identifier
        patient_id: String,
        /// Record type, e.g. diagnosis, vitals, medication
        record_type: String,
        /// Record text; remaining words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        data: Vec<String>,
    },

    /// Mine the pending block onto the chain
    Mine,

    /// View the entire blockchain
    View {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show one block
    Show {
        /// Block id
        id: u32,
    },

    /// Decrypt one record
    Decrypt {
        /// Block id
        block: u32,
        /// Transaction index within the block
        index: usize,
    },

    /// Verify chain integrity
    Verify,

    /// Write a timestamped backup
    Backup,

    /// Restore the most recent backup
    Restore,

    /// Read commands from stdin until `exit`
    Shell,
}

/// One line typed into the shell
#[derive(Parser)]
#[command(name = "ledger", no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Serialize)]
struct ChainView<'a> {
    difficulty: u32,
    block_count: u32,
    blocks: Vec<BlockView<'a>>,
    pending: BlockView<'a>,
}

#[derive(Serialize)]
struct BlockView<'a> {
    id: u32,
    created_at: i64,
    previous_hash: &'a str,
    hash: &'a str,
    nonce: u32,
    transactions: Vec<TransactionView<'a>>,
}

#[derive(Serialize)]
struct TransactionView<'a> {
    patient_id: &'a str,
    record_type: &'a str,
    timestamp: i64,
    iv: String,
    ciphertext_len: usize,
}

impl<'a> BlockView<'a> {
    fn new(block: &'a Block) -> Self {
        Self {
            id: block.id,
            created_at: block.created_at,
            previous_hash: block.previous_hash.as_str(),
            hash: block.hash.as_str(),
            nonce: block.nonce,
            transactions: block.transactions.iter().map(TransactionView::new).collect(),
        }
    }
}

impl<'a> TransactionView<'a> {
    fn new(tx: &'a Transaction) -> Self {
        Self {
            patient_id: &tx.patient_id,
            record_type: &tx.record_type,
            timestamp: tx.timestamp,
            iv: hex::encode(tx.payload.iv),
            ciphertext_len: tx.payload.len(),
        }
    }
}

/// CLI handler
pub struct CliHandler {
    config: LedgerConfig,
    storage: Storage,
    policy: StaticPolicy,
    key: Option<PayloadKey>,
}

impl CliHandler {
    /// Create a new CLI handler
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let storage = Storage::new(&config.data_dir);
        log::debug!(
            "Using data directory {} as {}",
            config.data_dir.display(),
            config.role
        );

        Ok(Self {
            config,
            storage,
            policy: StaticPolicy,
            key: None,
        })
    }

    pub fn from_options(options: &GlobalOptions) -> Result<Self> {
        Self::new(options.resolve()?)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Handle CLI command
    pub fn handle(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Init => self.init(),
            Commands::Keygen => self.keygen(),
            Commands::Add {
                patient_id,
                record_type,
                data,
            } => self.add(&patient_id, &record_type, &data.join(" ")),
            Commands::Mine => self.mine(),
            Commands::View { json } => self.view(json),
            Commands::Show { id } => self.show(id),
            Commands::Decrypt { block, index } => self.decrypt(block, index),
            Commands::Verify => self.verify(),
            Commands::Backup => self.backup(),
            Commands::Restore => self.restore(),
            Commands::Shell => {
                let stdin = io::stdin();
                self.run_shell(stdin.lock())
            }
        }
    }

    /// Interactive loop. Command failures are reported and the loop continues.
    pub fn run_shell<R: BufRead>(&mut self, input: R) -> Result<()> {
        println!("Medical record ledger shell. Type 'help' for commands, 'exit' to quit.");
        print_prompt();

        for line in input.lines() {
            let line = line.map_err(|e| LedgerError::io("<stdin>", e))?;
            match line.trim() {
                "" => {}
                "exit" | "quit" => break,
                text => {
                    if let Err(e) = self.handle_line(text) {
                        println!("Error: {}", e);
                    }
                }
            }
            print_prompt();
        }

        println!();
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let tokens = split_line(line).map_err(|reason| LedgerError::validation("command", reason))?;
        let parsed = match ShellLine::try_parse_from(tokens) {
            Ok(parsed) => parsed,
            Err(e) => {
                // covers `help` as well as usage errors
                println!("{}", e);
                return Ok(());
            }
        };

        match parsed.command {
            Commands::Shell => {
                println!("Already in the shell");
                Ok(())
            }
            command => self.handle(command),
        }
    }

    /// Initialize the ledger directory
    fn init(&mut self) -> Result<()> {
        self.authorize("chain", Action::Write)?;
        if self.storage.exists() {
            return Err(LedgerError::io(
                self.storage.data_path(),
                io::Error::new(io::ErrorKind::AlreadyExists, "ledger already initialized"),
            ));
        }

        let difficulty = self.config.difficulty()?;
        println!("Initializing ledger (difficulty {})...", difficulty);
        let chain = Chain::new(difficulty);
        self.storage.save(&chain)?;

        let key_path = self.config.key_path();
        if !key_path.exists() {
            self.key = Some(keystore::generate_key_file(&key_path)?);
            println!("✓ Payload key written to {}", key_path.display());
        }

        println!("✓ Genesis block created");
        println!("  Hash: {}", chain.genesis().hash);
        println!("  Data: {}", self.storage.dir().display());
        Ok(())
    }

    fn keygen(&mut self) -> Result<()> {
        self.authorize("keys", Action::Write)?;
        let key_path = self.config.key_path();
        self.key = Some(keystore::generate_key_file(&key_path)?);
        println!("✓ Payload key written to {}", key_path.display());
        Ok(())
    }

    fn add(&mut self, patient_id: &str, record_type: &str, data: &str) -> Result<()> {
        let key = self.key()?;
        let mut chain = self.load_chain()?;

        let record = NewRecord::plaintext(patient_id, record_type, unix_now(), data.as_bytes());
        chain.add_transaction_as(&self.policy, self.config.role, record, &key)?;
        self.storage.save(&chain)?;

        let pending = chain.pending();
        println!(
            "Success: record added to pending block {} ({}/{})",
            pending.id,
            pending.transactions.len(),
            MAX_TRANSACTIONS
        );
        if pending.is_full() {
            println!("  Pending block is full; run 'mine' to commit it");
        }
        Ok(())
    }

    fn mine(&mut self) -> Result<()> {
        self.authorize("chain", Action::Write)?;
        let mut chain = self.load_chain()?;
        if chain.pending().transactions.is_empty() {
            println!("Error: no transactions to mine");
            return Ok(());
        }

        println!(
            "Mining block {} at difficulty {}...",
            chain.pending().id,
            chain.difficulty()
        );
        let result = chain.mine_pending()?;
        self.storage.save(&chain)?;

        println!("Success: new block mined");
        println!("  Hash: {}", result.hash);
        println!("  Nonce: {}", result.nonce);
        println!(
            "  Attempts: {} in {:.2}s ({:.1} KH/s)",
            result.attempts,
            result.duration.as_secs_f64(),
            result.hash_rate() / 1000.0
        );
        Ok(())
    }

    fn view(&self, json: bool) -> Result<()> {
        self.authorize("chain", Action::Read)?;
        let chain = self.load_chain()?;

        if json {
            let view = ChainView {
                difficulty: chain.difficulty().zeros(),
                block_count: chain.block_count(),
                blocks: chain.blocks().iter().map(BlockView::new).collect(),
                pending: BlockView::new(chain.pending()),
            };
            let text = serde_json::to_string_pretty(&view)
                .map_err(|e| LedgerError::validation("view", e.to_string()))?;
            println!("{}", text);
            return Ok(());
        }

        println!(
            "Blockchain: {} blocks, {} records, difficulty {}",
            chain.block_count(),
            chain.transaction_count(),
            chain.difficulty()
        );
        for block in chain.blocks() {
            print_block(block, "Block");
        }
        if !chain.pending().transactions.is_empty() {
            print_block(chain.pending(), "Pending block");
        }
        Ok(())
    }

    fn show(&self, id: u32) -> Result<()> {
        self.authorize("chain", Action::Read)?;
        let chain = self.load_chain()?;
        let (block, label) = find_block(&chain, id)?;
        print_block(block, label);
        Ok(())
    }

    fn decrypt(&mut self, block_id: u32, index: usize) -> Result<()> {
        let key = self.key()?;
        let chain = self.load_chain()?;
        let (block, _) = find_block(&chain, block_id)?;
        let tx = block.transactions.get(index).ok_or_else(|| {
            LedgerError::validation(
                "index",
                format!("block {} holds {} records", block_id, block.transactions.len()),
            )
        })?;

        self.authorize(&tx.record_type, Action::Read)?;
        let plaintext = tx.decrypt(&key)?;
        println!("Patient: {}", tx.patient_id);
        println!("Type: {}", tx.record_type);
        println!("Recorded: {}", format_time(tx.timestamp));
        println!("Data: {}", String::from_utf8_lossy(&plaintext));
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        self.authorize("chain", Action::Read)?;
        let chain = self.load_chain()?;
        match chain.audit() {
            Ok(()) => {
                println!("Success: blockchain is valid ({} blocks)", chain.block_count());
                Ok(())
            }
            Err(e) => {
                println!("Error: blockchain is invalid");
                Err(LedgerError::format(self.storage.data_path(), e.to_string()))
            }
        }
    }

    fn backup(&self) -> Result<()> {
        self.authorize("chain", Action::Read)?;
        let chain = self.load_chain()?;
        let info = self.storage.backup(&chain)?;
        println!("✓ Backup written");
        println!("  Data: {}", info.data_path.display());
        println!("  Meta: {}", info.meta_path.display());
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        self.authorize("chain", Action::Write)?;
        // the live snapshot may be the thing that is broken
        let (chain, info) = match self.load_chain() {
            Ok(mut chain) => {
                let info = self.storage.restore(&mut chain)?;
                (chain, info)
            }
            Err(e) => {
                log::warn!("Live ledger unreadable ({}); restoring over it", e);
                self.storage.load_latest_backup()?
            }
        };
        self.storage.save(&chain)?;
        println!(
            "✓ Restored {} blocks from backup taken {}",
            chain.block_count(),
            format_time(info.timestamp)
        );
        Ok(())
    }

    fn authorize(&self, resource: &str, action: Action) -> Result<()> {
        self.policy.authorize(self.config.role, resource, action)
    }

    /// Load the payload key once per invocation
    fn key(&mut self) -> Result<PayloadKey> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }
        let key = keystore::load_key(self.config.key_path())?;
        self.key = Some(key.clone());
        Ok(key)
    }

    fn load_chain(&self) -> Result<Chain> {
        if !self.storage.exists() {
            return Err(LedgerError::io(
                self.storage.data_path(),
                io::Error::new(io::ErrorKind::NotFound, "ledger not initialized; run 'init' first"),
            ));
        }
        self.storage.load()
    }
}

fn find_block(chain: &Chain, id: u32) -> Result<(&Block, &'static str)> {
    if let Some(block) = chain.get_block(id) {
        return Ok((block, "Block"));
    }
    if chain.pending().id == id {
        return Ok((chain.pending(), "Pending block"));
    }
    Err(LedgerError::validation(
        "block",
        format!("no block with id {} (chain has {})", id, chain.block_count()),
    ))
}

fn print_prompt() {
    print!("{}", SHELL_PROMPT);
    let _ = io::stdout().flush();
}

/// Print block information
fn print_block(block: &Block, label: &str) {
    println!("{} {}:", label, block.id);
    println!("  Created: {}", format_time(block.created_at));
    println!("  Previous: {}", block.previous_hash);
    if block.hash.is_empty() {
        println!("  Hash: (not mined)");
    } else {
        println!("  Hash: {}", block.hash);
    }
    println!("  Nonce: {}", block.nonce);
    println!("  Records: {}", block.transactions.len());

    for (i, tx) in block.transactions.iter().enumerate() {
        println!(
            "    [{}] {} {} at {} ({} encrypted bytes)",
            i,
            tx.patient_id,
            tx.record_type,
            format_time(tx.timestamp),
            tx.payload.len()
        );
    }
}

fn format_time(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Split a shell line on whitespace, honouring single and double quotes
fn split_line(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn handler(dir: &TempDir, role: Role) -> CliHandler {
        let config = LedgerConfig {
            data_dir: dir.path().join("data"),
            difficulty: 1,
            key_file: None,
            role,
        };
        CliHandler::new(config).unwrap()
    }

    fn add(handler: &mut CliHandler, patient: &str, record_type: &str, data: &str) -> Result<()> {
        handler.handle(Commands::Add {
            patient_id: patient.to_string(),
            record_type: record_type.to_string(),
            data: data.split(' ').map(str::to_string).collect(),
        })
    }

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("add P1 vitals bp 120/80").unwrap().len(), 5);
        assert_eq!(
            split_line(r#"add P1 diagnosis "type 2 diabetes""#).unwrap(),
            vec!["add", "P1", "diagnosis", "type 2 diabetes"]
        );
        assert_eq!(split_line("  view   --json ").unwrap(), vec!["view", "--json"]);
        assert_eq!(split_line("add P1 note ''").unwrap(), vec!["add", "P1", "note", ""]);
        assert!(split_line("add 'P1").is_err());
        assert!(split_line("").unwrap().is_empty());
    }

    #[test]
    fn test_shell_line_parses_commands() {
        let parsed = ShellLine::try_parse_from(split_line("decrypt 1 0").unwrap()).unwrap();
        assert!(matches!(parsed.command, Commands::Decrypt { block: 1, index: 0 }));

        let parsed = ShellLine::try_parse_from(split_line("view --json").unwrap()).unwrap();
        assert!(matches!(parsed.command, Commands::View { json: true }));

        assert!(ShellLine::try_parse_from(split_line("frobnicate").unwrap()).is_err());
        assert!(ShellLine::try_parse_from(split_line("add P1 vitals").unwrap()).is_err());
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "med-ledger",
            "add",
            "P1",
            "vitals",
            "bp",
            "120/80",
            "--role",
            "nurse",
            "--difficulty",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.options.role, Some(Role::Nurse));

        let config = cli.options.resolve().unwrap();
        assert_eq!(config.role, Role::Nurse);
        assert_eq!(config.difficulty, 2);

        match cli.command {
            Commands::Add { data, .. } => assert_eq!(data.join(" "), "bp 120/80"),
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_options_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "difficulty = 3\nrole = \"nurse\"\n").unwrap();

        let options = GlobalOptions {
            config: Some(path),
            role: Some(Role::Admin),
            ..Default::default()
        };
        let config = options.resolve().unwrap();
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.role, Role::Admin);

        let bad = GlobalOptions {
            difficulty: Some(65),
            ..Default::default()
        };
        assert!(matches!(bad.resolve(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_init_add_mine_verify() {
        let dir = tempdir().unwrap();
        let mut handler = handler(&dir, Role::Doctor);

        handler.handle(Commands::Init).unwrap();
        assert!(handler.config().key_path().exists());
        assert!(handler.handle(Commands::Init).is_err());

        add(&mut handler, "P1", "diagnosis", "type 2 diabetes").unwrap();
        add(&mut handler, "P2", "vitals", "bp 130/85").unwrap();

        let pending = Storage::new(dir.path().join("data")).load().unwrap();
        assert_eq!(pending.block_count(), 1);
        assert_eq!(pending.pending().transactions.len(), 2);

        handler.handle(Commands::Mine).unwrap();
        handler.handle(Commands::Verify).unwrap();
        handler.handle(Commands::View { json: true }).unwrap();
        handler.handle(Commands::Show { id: 1 }).unwrap();
        handler.handle(Commands::Decrypt { block: 1, index: 0 }).unwrap();

        let chain = Storage::new(dir.path().join("data")).load().unwrap();
        assert_eq!(chain.block_count(), 2);
        assert_eq!(chain.blocks()[1].previous_hash, chain.blocks()[0].hash);
        let key = keystore::load_key(handler.config().key_path()).unwrap();
        assert_eq!(
            chain.blocks()[1].transactions[0].decrypt(&key).unwrap(),
            b"type 2 diabetes"
        );
    }

    #[test]
    fn test_commands_need_init() {
        let dir = tempdir().unwrap();
        let mut handler = handler(&dir, Role::Doctor);
        assert!(handler.handle(Commands::View { json: false }).unwrap_err().is_not_found());
    }

    #[test]
    fn test_roles_are_enforced() {
        let dir = tempdir().unwrap();
        handler(&dir, Role::Admin).handle(Commands::Init).unwrap();

        let mut nurse = handler(&dir, Role::Nurse);
        add(&mut nurse, "P1", "vitals", "pulse 72").unwrap();
        assert!(matches!(
            add(&mut nurse, "P1", "diagnosis", "flu"),
            Err(LedgerError::AccessDenied { .. })
        ));
        assert!(matches!(nurse.handle(Commands::Mine), Err(LedgerError::AccessDenied { .. })));

        let mut viewer = handler(&dir, Role::ReadOnly);
        viewer.handle(Commands::View { json: false }).unwrap();
        viewer.handle(Commands::Decrypt { block: 1, index: 0 }).unwrap();
        assert!(matches!(
            add(&mut viewer, "P2", "vitals", "pulse 80"),
            Err(LedgerError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = tempdir().unwrap();
        let mut handler = handler(&dir, Role::Admin);
        handler.handle(Commands::Init).unwrap();
        add(&mut handler, "P1", "diagnosis", "asthma").unwrap();
        handler.handle(Commands::Mine).unwrap();
        handler.handle(Commands::Backup).unwrap();

        add(&mut handler, "P2", "diagnosis", "migraine").unwrap();
        handler.handle(Commands::Mine).unwrap();
        handler.handle(Commands::Restore).unwrap();

        let chain = Storage::new(dir.path().join("data")).load().unwrap();
        assert_eq!(chain.block_count(), 2);
        assert!(chain.verify());
    }

    fn backed_up_ledger(dir: &TempDir) -> CliHandler {
        let mut handler = handler(dir, Role::Admin);
        handler.handle(Commands::Init).unwrap();
        add(&mut handler, "P1", "diagnosis", "asthma").unwrap();
        handler.handle(Commands::Mine).unwrap();
        handler.handle(Commands::Backup).unwrap();
        handler
    }

    #[test]
    fn test_restore_over_corrupt_data_file() {
        let dir = tempdir().unwrap();
        let mut handler = backed_up_ledger(&dir);
        let storage = Storage::new(dir.path().join("data"));
        std::fs::write(storage.data_path(), b"garbage").unwrap();
        assert!(storage.load().is_err());

        handler.handle(Commands::Restore).unwrap();

        let chain = storage.load().unwrap();
        assert_eq!(chain.block_count(), 2);
        assert!(chain.verify());
    }

    #[test]
    fn test_restore_over_missing_data_file() {
        let dir = tempdir().unwrap();
        let mut handler = backed_up_ledger(&dir);
        let storage = Storage::new(dir.path().join("data"));
        std::fs::remove_file(storage.data_path()).unwrap();

        handler.handle(Commands::Restore).unwrap();

        let chain = storage.load().unwrap();
        assert_eq!(chain.block_count(), 2);
        assert!(chain.verify());
        handler.handle(Commands::Decrypt { block: 1, index: 0 }).unwrap();
    }

    #[test]
    fn test_shell_session() {
        let dir = tempdir().unwrap();
        let mut handler = handler(&dir, Role::Doctor);
        let script = "init\nadd P1 prescription \"metformin 500mg\"\nhelp\nbogus\nshow 99\nmine\nverify\nexit\nadd P9 vitals ignored\n";

        handler.run_shell(script.as_bytes()).unwrap();

        let chain = Storage::new(dir.path().join("data")).load().unwrap();
        assert_eq!(chain.block_count(), 2);
        assert!(chain.pending().transactions.is_empty());
        assert_eq!(chain.blocks()[1].transactions[0].patient_id, "P1");
    }
}
