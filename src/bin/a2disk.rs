/// Interactive console for Apple II disk images

use a2disk::*;
use log::{Level, LevelFilter, Log, Metadata, Record};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                "cat",
                "cd",
                "close",
                "commit",
                "dir",
                "exit",
                "export",
                "help",
                "import",
                "info",
                "log",
                "ls",
                "mkdir",
                "new",
                "open",
                "quit",
                "read",
                "read-block",
                "rm",
                "save",
                "show-deleted",
            ],
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the first word (command name)
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Logger writing to stderr, filtered by the global max level
struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        let _ = writeln!(std::io::stderr(), "[{:5}] {}", tag, record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn init_logging() {
    let level = std::env::var("A2DISK_LOG")
        .ok()
        .and_then(|value| LevelFilter::from_str(&value).ok())
        .unwrap_or(LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Get the path to the history file
fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".a2disk_history");
        p
    })
}

/// What is currently open
enum Mounted {
    /// ProDOS volume
    Volume(Volume),
    /// Storage without a recognisable volume
    Raw(BlockStorage),
}

impl Mounted {
    fn storage(&self) -> &BlockStorage {
        match self {
            Mounted::Volume(volume) => volume.storage(),
            Mounted::Raw(storage) => storage,
        }
    }

    fn storage_mut(&mut self) -> &mut BlockStorage {
        match self {
            Mounted::Volume(volume) => volume.storage_mut(),
            Mounted::Raw(storage) => storage,
        }
    }

    fn volume(&self) -> Option<&Volume> {
        match self {
            Mounted::Volume(volume) => Some(volume),
            Mounted::Raw(_) => None,
        }
    }

    fn volume_mut(&mut self) -> Option<&mut Volume> {
        match self {
            Mounted::Volume(volume) => Some(volume),
            Mounted::Raw(_) => None,
        }
    }
}

/// Console state
struct Session {
    mounted: Option<Mounted>,
    cwd: Vec<String>,
    show_deleted: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            mounted: None,
            cwd: Vec::new(),
            show_deleted: false,
        }
    }

    fn cwd_path(&self) -> String {
        self.cwd.join("/")
    }

    fn prompt(&self) -> String {
        match self.mounted.as_ref().and_then(|m| m.volume()) {
            Some(volume) => {
                let name = volume.name().unwrap_or_default();
                if self.cwd.is_empty() {
                    format!("/{}> ", name)
                } else {
                    format!("/{}/{}> ", name, self.cwd_path())
                }
            }
            None if self.mounted.is_some() => "[raw]> ".to_string(),
            None => "> ".to_string(),
        }
    }

    fn volume(&self) -> Result<&Volume> {
        self.mounted
            .as_ref()
            .and_then(|m| m.volume())
            .ok_or_else(|| DiskError::filesystem("no ProDOS volume open"))
    }

    fn volume_mut(&mut self) -> Result<&mut Volume> {
        self.mounted
            .as_mut()
            .and_then(|m| m.volume_mut())
            .ok_or_else(|| DiskError::filesystem("no ProDOS volume open"))
    }

    fn storage(&self) -> Result<&BlockStorage> {
        self.mounted
            .as_ref()
            .map(|m| m.storage())
            .ok_or_else(|| DiskError::access("no image open"))
    }

    fn current_directory(&self) -> Result<Directory> {
        let mut directory = self.volume()?.directory_at(&self.cwd_path())?;
        directory.set_all_entries_visible(self.show_deleted);
        Ok(directory)
    }

    fn warn_if_dirty(&self) {
        if let Some(mounted) = &self.mounted {
            let pending = mounted.storage().dirty_blocks().len();
            if pending > 0 {
                println!("Discarding {} uncommitted blocks.", pending);
            }
        }
    }

    fn open(&mut self, path: &str, read_only: bool) -> Result<()> {
        let mut storage = BlockStorage::from_path(path)?;
        if read_only {
            storage.open()?;
        } else {
            match storage.open_for_writing() {
                Ok(()) => {}
                Err(DiskError::Access(_)) => {
                    println!("Image is not writable; opened read-only.");
                    storage.open()?;
                }
                Err(e) => return Err(e),
            }
        }
        self.close();
        self.mounted = Some(match Volume::open(storage) {
            Ok(volume) => Mounted::Volume(volume),
            Err(DiskError::InvalidFormat(_)) => {
                println!("No ProDOS volume found; block access only.");
                let mut storage = BlockStorage::from_path(path)?;
                storage.open()?;
                Mounted::Raw(storage)
            }
            Err(e) => return Err(e),
        });
        Ok(())
    }

    fn create(&mut self, path: &str, blocks: usize, name: &str) -> Result<()> {
        let mut builder = BlockStorageBuilder::new().block_count(blocks).file(path);
        match ImageFormat::from_extension(path) {
            Some(ImageFormat::TwoImg) => builder = builder.two_img(),
            Some(ImageFormat::DosOrder) => {
                builder = builder.addressing_mode(AddressingMode::DosOrder)
            }
            _ => {}
        }
        let mut storage = builder.build()?;
        storage.open_for_writing()?;
        let mut volume = Volume::format(storage, name)?;
        volume.commit()?;
        self.close();
        self.mounted = Some(Mounted::Volume(volume));
        Ok(())
    }

    fn close(&mut self) {
        self.warn_if_dirty();
        if let Some(mut mounted) = self.mounted.take() {
            mounted.storage_mut().close();
        }
        self.cwd.clear();
    }
}

fn main() {
    init_logging();

    println!("=== a2disk ===");
    println!("Interactive console for Apple II DOS 3.3 and ProDOS disk images.");
    println!("Type 'help' for available commands\n");

    let mut rl = match Editor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Failed to create editor: {}", e);
            return;
        }
    };
    rl.set_helper(Some(CommandCompleter::new()));

    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let mut session = Session::new();

    loop {
        let readline = rl.readline(&session.prompt());
        let input = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }
        let command = parts[0].to_lowercase();

        if command == "quit" || command == "exit" {
            break;
        }
        if let Err(e) = run_command(&mut session, &command, &parts[1..]) {
            println!("Error: {}", e);
        }
    }

    if let Some(history_path) = history_path() {
        let _ = rl.save_history(&history_path);
    }
    session.close();
    println!("Goodbye!");
}

fn run_command(session: &mut Session, command: &str, args: &[String]) -> Result<()> {
    match command {
        "help" => print_help(),
        "open" => {
            let Some(path) = args.first() else {
                println!("Usage: open <path> [ro]");
                return Ok(());
            };
            let read_only = args.get(1).is_some_and(|a| a.eq_ignore_ascii_case("ro"));
            session.open(path, read_only)?;
            println!("Opened: {}", path);
        }
        "new" => {
            let Some(path) = args.first() else {
                println!("Usage: new <path> [blocks] [volume_name]");
                return Ok(());
            };
            let blocks = match args.get(1) {
                Some(b) => b
                    .parse()
                    .map_err(|_| DiskError::invalid_format(format!("bad block count {}", b)))?,
                None => BLOCKS_525,
            };
            let default_name = Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = sanitize_name(args.get(2).unwrap_or(&default_name));
            session.create(path, blocks, &name)?;
            println!("Created /{} ({} blocks) in {}", name, blocks, path);
        }
        "info" => print_info(session)?,
        "ls" | "cat" | "dir" => {
            let directory = match args.first() {
                Some(path) => {
                    let full = join_path(&session.cwd_path(), path);
                    let mut directory = session.volume()?.directory_at(&full)?;
                    directory.set_all_entries_visible(session.show_deleted);
                    directory
                }
                None => session.current_directory()?,
            };
            print_listing(&directory, session.volume()?)?;
        }
        "cd" => {
            let target = args.first().map(String::as_str).unwrap_or("/");
            let next = resolve_cwd(&session.cwd, target);
            let directory = session.volume()?.directory_at(&next.join("/"))?;
            session.cwd = next;
            println!("/{}", directory.name()?);
        }
        "read-block" => {
            let Some(index) = args.first().and_then(|a| parse_number(a)) else {
                println!("Usage: read-block <index>");
                return Ok(());
            };
            let storage = session.storage()?;
            let data = storage.data_for_block(index)?;
            println!("Block {} ({} bytes):", index, data.len());
            if storage.addressing_mode() == AddressingMode::DosOrder {
                let t = storage.translator();
                println!(
                    "  stored at {} and {}",
                    t.dos_track_sector(index, false),
                    t.dos_track_sector(index, true)
                );
            }
            print_hex_dump(&data, data.len());
        }
        "read" => {
            let Some(name) = args.first() else {
                println!("Usage: read <file>");
                return Ok(());
            };
            let path = join_path(&session.cwd_path(), name);
            let data = FileSystem::read_file(session.volume()?, &path)?;
            println!("File: {} ({} bytes)", path, data.len());
            print_hex_dump(&data, 256);
        }
        "export" => {
            let Some(name) = args.first() else {
                println!("Usage: export <file> [output_path]");
                return Ok(());
            };
            let path = join_path(&session.cwd_path(), name);
            let data = FileSystem::read_file(session.volume()?, &path)?;
            let output = args.get(1).unwrap_or(name);
            std::fs::write(output, &data)?;
            println!("Exported {} bytes to {}", data.len(), output);
        }
        "import" => {
            let Some(host_path) = args.first() else {
                println!("Usage: import <host_path> [name] [type]");
                return Ok(());
            };
            let data = std::fs::read(host_path)?;
            let file_type = match args.get(2) {
                Some(t) => parse_number(t)
                    .and_then(|t| u8::try_from(t).ok())
                    .ok_or_else(|| DiskError::invalid_format(format!("bad file type {}", t)))?,
                None => 0x06,
            };
            let mut directory = session.current_directory()?;
            let name = match args.get(1) {
                Some(name) => validate_name(name)?,
                None => {
                    let stem = Path::new(host_path)
                        .file_name()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    directory.unique_name_from_string(&stem)
                }
            };
            let entry = FileEntry::new(&name, file_type)?;
            let volume = session.volume_mut()?;
            let location = directory.create_file_with_entry(volume, entry, &data)?;
            println!("Imported {} ({} bytes) at {}", name, data.len(), location);
        }
        "mkdir" => {
            let Some(name) = args.first() else {
                println!("Usage: mkdir <name>");
                return Ok(());
            };
            let mut directory = session.current_directory()?;
            let volume = session.volume_mut()?;
            let entry = directory.create_directory_with_name(volume, name)?;
            println!("Created directory {} at block {}", entry.name(), entry.key_pointer);
        }
        "rm" => {
            let Some(name) = args.first() else {
                println!("Usage: rm <name>");
                return Ok(());
            };
            let mut directory = session.current_directory()?;
            let location = directory
                .find(name)
                .map(|slot| slot.location)
                .ok_or_else(|| DiskError::FileNotFound(name.clone()))?;
            let volume = session.volume_mut()?;
            directory.delete_file_entry(volume, location)?;
            println!("Deleted {}", name.to_ascii_uppercase());
        }
        "show-deleted" => {
            match args.first().map(|a| a.to_lowercase()) {
                Some(ref a) if a == "on" => session.show_deleted = true,
                Some(ref a) if a == "off" => session.show_deleted = false,
                _ => {}
            }
            println!(
                "Deleted entries are {}",
                if session.show_deleted { "shown and kept" } else { "hidden and cleared" }
            );
        }
        "commit" => {
            let storage = session
                .mounted
                .as_mut()
                .map(|m| m.storage_mut())
                .ok_or_else(|| DiskError::access("no image open"))?;
            let pending = storage.dirty_blocks().len();
            storage.commit_modified_blocks()?;
            println!("Committed {} blocks", pending);
        }
        "save" => {
            let Some(path) = args.first() else {
                println!("Usage: save <path>");
                return Ok(());
            };
            session.storage()?.save_as(path)?;
            println!("Saved to {}", path);
        }
        "close" => {
            session.close();
            println!("Closed");
        }
        "log" => match args.first() {
            Some(level) => {
                let filter = LevelFilter::from_str(level).map_err(|_| {
                    DiskError::invalid_format(format!("unknown log level {}", level))
                })?;
                log::set_max_level(filter);
                println!("Log level: {}", filter);
            }
            None => println!("Log level: {}", log::max_level()),
        },
        other => {
            println!("Unknown command: {}. Type 'help' for available commands.", other);
        }
    }
    Ok(())
}

fn join_path(cwd: &str, name: &str) -> String {
    if name.starts_with('/') || cwd.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", cwd, name)
    }
}

fn resolve_cwd(cwd: &[String], target: &str) -> Vec<String> {
    let mut next: Vec<String> = if target.starts_with('/') {
        Vec::new()
    } else {
        cwd.to_vec()
    };
    for part in target.split('/').filter(|p| !p.is_empty()) {
        match part {
            "." => {}
            ".." => {
                next.pop();
            }
            name => next.push(name.to_ascii_uppercase()),
        }
    }
    next
}

fn parse_number(s: &str) -> Option<usize> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Parse command line input, respecting quoted strings
fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn print_help() {
    println!("Available commands:");
    println!("  open <path> [ro]               - Open a .po/.hdv/.do/.dsk/.2mg image (use quotes for paths with spaces)");
    println!("  new <path> [blocks] [name]     - Create and format a new ProDOS image (default 280 blocks)");
    println!("  info                           - Show image and volume information");
    println!("  ls [path]                      - List a directory (cat, dir)");
    println!("  cd <path>                      - Change directory (.., / supported)");
    println!("  read-block <index>             - Hex dump a block");
    println!("  read <file>                    - Hex dump a file");
    println!("  export <file> [output_path]    - Copy a file to the host");
    println!("  import <host_path> [name] [type] - Copy a host file into the current directory");
    println!("  mkdir <name>                   - Create a subdirectory");
    println!("  rm <name>                      - Delete a file or directory tree");
    println!("  show-deleted [on|off]          - List deleted entries and keep them on delete");
    println!("  commit                         - Write pending changes to the image");
    println!("  save <path>                    - Save a copy of the image, pending changes included");
    println!("  close                          - Close the image, discarding pending changes");
    println!("  log [off|error|warn|info|debug|trace] - Show or set the log level");
    println!("  help                           - Show this help");
    println!("  quit, exit                     - Exit");
}

fn print_info(session: &Session) -> Result<()> {
    let storage = session.storage()?;
    if let Some(path) = storage.path() {
        println!("Filename: {}", path.display());
    }
    println!("Layout: {}", storage.addressing_mode());
    println!("Block size: {} bytes", storage.block_size());
    println!("Blocks: {}", storage.length());
    println!("Header: {} bytes", storage.header_data().len());
    println!("Partition offset: {} blocks", storage.partition_offset());
    println!("Writable: {}", if storage.is_writable() { "Yes" } else { "No" });
    println!("Uncommitted blocks: {}", storage.dirty_blocks().len());

    if let Ok(volume) = session.volume() {
        let info = volume.info()?;
        println!();
        println!("{} volume /{}", info.fs_type, info.volume_name);
        println!("Total blocks: {}", info.total_blocks);
        println!("Free blocks: {}", info.free_blocks);
        println!("Free space: {} KB", info.free_blocks * info.block_size / 1024);
    }
    Ok(())
}

fn print_listing(directory: &Directory, volume: &Volume) -> Result<()> {
    let entries = filesystem::list_directory(directory);
    println!("/{}", directory.name()?);
    if entries.is_empty() {
        println!("No files found.");
    } else {
        println!(
            "{:<1}{:<15} {:<4} {:>6} {:<16} {:>8} {:<6} {:<6}",
            "", "Name", "Type", "Blocks", "Modified", "Size", "Aux", "Access"
        );
        println!("{}", "-".repeat(72));
        for entry in &entries {
            println!(
                "{:<1}{:<15} {:<4} {:>6} {:<16} {:>8} ${:04X} {:<6}",
                if entry.is_deleted() { "x" } else { " " },
                entry.name,
                file_type_name(entry.file_type),
                entry.blocks,
                entry.modified.to_string(),
                entry.size,
                entry.aux_type,
                entry.access.to_string()
            );
        }
    }
    println!(
        "\nBlocks free: {}  Blocks used: {}  Total blocks: {}",
        volume.free_block_count(),
        volume.total_blocks() - volume.free_block_count(),
        volume.total_blocks()
    );
    Ok(())
}

fn file_type_name(file_type: u8) -> String {
    let name = match file_type {
        0x00 => "NON",
        0x01 => "BAD",
        0x04 => "TXT",
        0x06 => "BIN",
        0x0F => "DIR",
        0x19 => "ADB",
        0x1A => "AWP",
        0x1B => "ASP",
        0xB3 => "S16",
        0xC1 => "PIC",
        0xEF => "PAS",
        0xF0 => "CMD",
        0xFC => "BAS",
        0xFD => "VAR",
        0xFE => "REL",
        0xFF => "SYS",
        other => return format!("${:02X}", other),
    };
    name.to_string()
}

fn print_hex_dump(data: &[u8], max_bytes: usize) {
    let len = data.len().min(max_bytes);

    for (i, chunk) in data[..len].chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }

        // Pad if less than 16 bytes
        for j in chunk.len()..16 {
            print!("   ");
            if j == 7 {
                print!(" ");
            }
        }

        print!(" |");

        // Apple II text has the high bit set
        for byte in chunk {
            let b = byte & 0x7F;
            let c = if (32..127).contains(&b) { b as char } else { '.' };
            print!("{}", c);
        }

        println!("|");
    }

    if data.len() > max_bytes {
        println!("... ({} more bytes)", data.len() - max_bytes);
    }
}
