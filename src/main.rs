use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use braid::cpu::disassemble;
use braid::{AsmParser, Cpu, Memory};

/// Braid is an assembler & emulator toolchain for the BR16 16-bit RISC
/// architecture.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file into a flat binary image
    Asm {
        /// `.asm` file to assemble
        input: PathBuf,
        /// Destination for the binary image
        output: Option<PathBuf>,
    },
    /// Run a text `.asm` or binary file and output to terminal
    Run {
        /// File to run
        file: PathBuf,
        /// Trace every instruction with registers and flags
        #[arg(short, long)]
        debug: bool,
        /// Dump the first 256 bytes of memory after execution
        #[arg(short, long)]
        memdump: bool,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let Some(command) = args.command else {
        println!("\n~ braid v{VERSION} ~");
        println!("{SHORT_INFO}");
        return Ok(());
    };

    match command {
        Command::Asm { input, output } => {
            let image = assemble_file(&input)?;
            let output = output.unwrap_or_else(|| input.with_extension("bin"));
            fs::write(&output, &image).into_diagnostic()?;
            println!(
                "{:>12} {} bytes to {}",
                "Finished".green().bold(),
                image.len(),
                output.display()
            );
        }
        Command::Run {
            file,
            debug,
            memdump,
        } => {
            let image = if file.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("asm")) {
                assemble_file(&file)?
            } else {
                fs::read(&file).into_diagnostic()?
            };
            run(&image, debug, memdump)?;
        }
        Command::Check { file } => {
            let _ = assemble_file(&file)?;
            println!("{:>12} with 0 errors", "Finished".green().bold());
        }
    }
    Ok(())
}

/// Assemble a source file into a byte image.
fn assemble_file(path: &Path) -> Result<Vec<u8>> {
    // Leaked so diagnostics can carry the source for their whole lifetime
    let contents: &'static str =
        Box::leak(Box::new(fs::read_to_string(path).into_diagnostic()?));
    println!(
        "{:>12} target {}",
        "Assembling".green().bold(),
        path.display()
    );
    let parser = AsmParser::new(contents)?;
    let mut air = parser.parse()?;
    air.backpatch()?;
    air.assemble()
}

/// Load an image at address 0 and execute until halt.
fn run(image: &[u8], debug: bool, memdump: bool) -> Result<()> {
    let mut mem = Memory::new();
    mem.load_program(image, 0)?;
    println!("{:>12} {} bytes", "Loaded".green().bold(), image.len());

    let mut cpu = Cpu::new();
    if debug {
        println!("{:>12} with trace", "Running".green().bold());
        while !cpu.halted() {
            let (text, _) = disassemble(&mem, cpu.pc());
            println!("[{}] {}", cpu.instruction_count(), text);
            cpu.step(&mut mem);
            println!("{cpu}");
            println!("{}", cpu.flags());
        }
    } else {
        println!("{:>12} binary", "Running".green().bold());
        cpu.run(&mut mem);
    }

    println!(
        "{:>12} after {} instructions",
        "Halted".green().bold(),
        cpu.instruction_count()
    );
    println!("{cpu}");
    println!("{}", cpu.flags());

    if memdump {
        print!("{}", mem.dump(0x0000, 0x00FF));
    }
    Ok(())
}

const SHORT_INFO: &str = r"
Welcome to braid, an assembler & emulator toolchain for the
BR16 16-bit RISC architecture.
Please use `-h` or `--help` to access the usage instructions.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
