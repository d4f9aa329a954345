//! tritos - CLI Entry Point
//!
//! Commands:
//! - `tritos run <program>` - Run a T3 program (assembly or image) on a bare TVM
//! - `tritos asm <source>` - Assemble to a T3 image
//! - `tritos disasm <image>` - Disassemble a T3 image
//! - `tritos reduce <term>` - Reduce a lambda term to normal form
//! - `tritos infer <term>` - Infer a lambda term's simple type
//! - `tritos boot <programs...>` - Boot the kernel and run programs as processes
//! - `tritos test` - Built-in self test

use std::fmt::Display;
use std::path::Path;
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde_json::json;

use tritos::asm::disasm::disassemble_instruction;
use tritos::kernel::{Console, StdoutConsole, KERNEL_PID};
use tritos::lambda::church::{as_boolean, as_numeral};
use tritos::lambda::{infer_type, parse_term, reduce_to_normal_form, ReductionContext};
use tritos::tvm::registers::{Registers, R_STATUS};
use tritos::tvm::StepEvent;
use tritos::{assemble, disassemble, load_image, save_image, Kernel, KernelConfig, Trit, Tvm, TvmConfig, Word};

#[derive(Parser)]
#[command(name = "tritos")]
#[command(version)]
#[command(about = "An experimental balanced ternary kernel with a lambda-calculus syscall surface")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program on a bare TVM until it halts
    Run {
        /// Assembly (.asm) or T3 image
        program: String,
        /// Maximum number of instructions
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Print each instruction before it executes
        #[arg(short, long)]
        trace: bool,
        /// TVM memory size in words
        #[arg(long, default_value = "1024")]
        memory_words: usize,
    },
    /// Assemble source to a T3 image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image (default: source with .t3 extension)
        #[arg(short, long)]
        output: Option<String>,
        /// Write the text format (one 27-trit word per line)
        #[arg(long)]
        text: bool,
    },
    /// Disassemble a T3 image
    Disasm {
        image: String,
    },
    /// Reduce a lambda term, e.g. "(\x. x) (\y. y)"
    Reduce {
        term: String,
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
    },
    /// Infer the simple type of a lambda term
    Infer {
        term: String,
    },
    /// Boot the kernel and run each program as a process
    Boot {
        /// Programs to spawn (assembly or T3 images)
        programs: Vec<String>,
        /// Kernel configuration (TOML)
        #[arg(short, long)]
        config: Option<String>,
        /// Maximum number of timer ticks
        #[arg(short, long, default_value = "1000")]
        ticks: u64,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { program, max_steps, trace, memory_words } => {
            run_program(&program, max_steps, trace, memory_words, cli.json);
        }
        Commands::Asm { source, output, text } => assemble_file(&source, output, text),
        Commands::Disasm { image } => disassemble_file(&image),
        Commands::Reduce { term, max_steps } => reduce_term(&term, max_steps, cli.json),
        Commands::Infer { term } => infer_term(&term, cli.json),
        Commands::Boot { programs, config, ticks } => boot_kernel(&programs, config, ticks, cli.json),
        Commands::Test => run_self_test(),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn fail(msg: impl Display) -> ! {
    eprintln!("❌ {}", msg);
    std::process::exit(1);
}

/// Assemble `.asm` sources, load anything else as an image.
fn load_words(path: &str) -> Vec<Word> {
    if path.ends_with(".asm") {
        let source = std::fs::read_to_string(path).unwrap_or_else(|e| fail(format!("Failed to read {}: {}", path, e)));
        let words = assemble(&source).unwrap_or_else(|e| fail(format!("Assembly error: {}", e)));
        debug!("assembled {} words from {}", words.len(), path);
        words
    } else {
        load_image(path).unwrap_or_else(|e| fail(format!("Failed to load {}: {}", path, e)))
    }
}

fn run_program(path: &str, max_steps: u64, trace: bool, memory_words: usize, json: bool) {
    let words = load_words(path);
    if words.is_empty() {
        fail("No instructions to execute");
    }

    let config = TvmConfig { memory_words, ..TvmConfig::default() };
    let mut vm = Tvm::new(&config);
    if let Err(e) = vm.load_program(&words) {
        fail(format!("Failed to load program: {}", e));
    }

    let mut steps = 0u64;
    while steps < max_steps {
        if trace {
            let pc = vm.regs.pc();
            let text = usize::try_from(pc)
                .ok()
                .and_then(|a| vm.mem.read_word(a).ok())
                .map(disassemble_instruction)
                .unwrap_or_else(|| "???".to_string());
            println!("{:04}: {:<24} sp={}", pc, text, vm.regs.sp());
        }
        steps += 1;
        match vm.step() {
            Ok(StepEvent::Executed) => {}
            // No syscall host on a bare machine
            Ok(StepEvent::Syscall) => {
                vm.regs.set_trit(R_STATUS, Trit::N);
            }
            Ok(StepEvent::Halted) => break,
            Err(e) => {
                eprintln!("❌ Fault at PC={}: {}", vm.regs.pc(), e);
                break;
            }
        }
    }

    let status = if vm.has_error() {
        Trit::X
    } else if vm.is_halted() {
        Trit::O
    } else {
        Trit::P
    };
    let registers: Vec<(String, i64)> = vm.regs.iter().map(|(i, w)| (Registers::name(i), w.to_i64())).collect();

    if json {
        let out = json!({
            "status": status.to_string(),
            "halted": vm.is_halted(),
            "error": vm.has_error(),
            "registers": registers,
            "counters": vm.counters(),
        });
        println!("{}", out);
        return;
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Status: {}", status);
    println!("Instructions: {}", vm.counters().instructions_executed);
    for (name, value) in registers.iter().filter(|(_, v)| *v != 0) {
        println!("  {:>3} = {}", name, value);
    }
    let c = vm.counters();
    println!("I-cache: {} hits, {} misses", c.cache_hits, c.cache_misses);
    println!("Branches: {} predicted, {} mispredicted", c.branch_predictions, c.branch_mispredictions);
    if steps >= max_steps && !vm.is_halted() {
        println!();
        println!("⚠️  Reached the step limit ({}). Use --max-steps to increase.", max_steps);
    }
}

fn assemble_file(source_path: &str, output: Option<String>, text: bool) {
    let out_path = output.unwrap_or_else(|| {
        Path::new(source_path).with_extension("t3").to_string_lossy().into_owned()
    });
    let source = std::fs::read_to_string(source_path).unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));
    let words = assemble(&source).unwrap_or_else(|e| fail(format!("Assembly error: {}", e)));

    if let Err(e) = save_image(&out_path, &words, !text) {
        fail(format!("Failed to save image: {}", e));
    }
    println!("✓ Assembled {} words to {}", words.len(), out_path);
}

fn disassemble_file(path: &str) {
    let words = load_image(path).unwrap_or_else(|e| fail(format!("Failed to load image: {}", e)));
    println!("{}", disassemble(&words));
}

fn reduce_term(src: &str, max_steps: u64, json: bool) {
    let t = parse_term(src).unwrap_or_else(|e| fail(e));
    let mut ctx = ReductionContext::with_steps(max_steps);
    let nf = reduce_to_normal_form(&t, &mut ctx);
    let numeral = as_numeral(&nf);
    let boolean = as_boolean(&nf);

    if json {
        let out = json!({
            "normal_form": nf.to_string(),
            "steps": ctx.reduction_count,
            "timeout": ctx.timeout,
            "numeral": numeral,
            "boolean": boolean,
        });
        println!("{}", out);
    } else {
        println!("{}", nf);
        println!("steps: {}", ctx.reduction_count);
        if let Some(n) = numeral {
            println!("numeral: {}", n);
        } else if let Some(b) = boolean {
            println!("boolean: {}", b);
        }
    }
    if ctx.timeout {
        fail(format!("No normal form within {} steps", max_steps));
    }
}

fn infer_term(src: &str, json: bool) {
    let t = parse_term(src).unwrap_or_else(|e| fail(e));
    let ty = infer_type(&t).unwrap_or_else(|e| fail(e));
    if json {
        println!("{}", json!({ "term": t.to_string(), "type": ty.to_string() }));
    } else {
        println!("{} : {}", t, ty);
    }
}

fn boot_kernel(programs: &[String], config: Option<String>, ticks: u64, json: bool) {
    let config = match config {
        Some(path) => KernelConfig::load(&path).unwrap_or_else(|e| fail(e)),
        None => KernelConfig::default(),
    };
    let console: Box<dyn Console> = Box::new(StdoutConsole);
    let mut kernel = Kernel::boot(config, console).unwrap_or_else(|e| fail(e));

    for path in programs {
        let words = load_words(path);
        let name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let pid = kernel.spawn(&name, &words, KERNEL_PID).unwrap_or_else(|e| fail(e));
        info!("spawned {} as pid {}", path, pid);
    }

    let ran = kernel.run_until_idle(ticks);
    let stats = *kernel.stats();
    let table = kernel.ps();

    if json {
        println!("{}", json!({ "ticks": ran, "stats": stats, "processes": table }));
        return;
    }

    println!();
    println!("━━━ Kernel ━━━");
    println!("Ticks: {}", ran);
    println!(
        "Syscalls: {} ({} failed), switches: {}, preemptions: {}",
        stats.total_syscalls, stats.failed_syscalls, stats.context_switches, stats.preemptions
    );
    println!("Processes created: {}, destroyed: {}", stats.processes_created, stats.processes_destroyed);
    println!();
    println!("{:>4} {:>5} {:<12} {:<8} {:>4} {:>6} {:>8}", "PID", "PPID", "NAME", "STATE", "PRI", "TICKS", "INSNS");
    for p in &table {
        let ppid = p.ppid.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!(
            "{:>4} {:>5} {:<12} {:<8} {:>4} {:>6} {:>8}",
            p.pid, ppid, p.name, p.state, p.priority, p.ticks, p.instructions
        );
    }
    if kernel.has_live_user_process() {
        println!();
        println!("⚠️  Processes still alive after {} ticks. Use --ticks to increase.", ticks);
    }
}

fn run_self_test() {
    use tritos::kernel::BufferConsole;
    use tritos::lambda::{alpha_equiv, church};
    use tritos::ternary::Alu;

    println!("━━━ tritos Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    // Trit algebra
    check("Trit negation involution", Trit::ALL.iter().all(|t| t.neg().neg() == *t));
    let mut alu = Alu::new();
    let sat = alu.add(Trit::P, Trit::P) == Trit::P && alu.flags.overflow;
    check("Saturating add sets overflow", sat);
    check("Opposites cancel", Alu::new().add(Trit::P, Trit::N) == Trit::O);

    // TVM
    let ok = assemble("LOAD r0, 1\nLOAD r1, 1\nADD r2, r0, r1\nHALT").is_ok_and(|words| {
        let mut vm = Tvm::with_memory_words(64);
        vm.load_program(&words).is_ok()
            && vm.run() == Trit::O
            && vm.regs.value(2) == 1
            && vm.counters().instructions_executed == 4
    });
    check("TVM program halts with r2 = P", ok);

    // Lambda
    let five = church::numeral(5);
    let sum = tritos::Term::app_all(church::add(), &[church::numeral(2), church::numeral(3)]);
    let mut ctx = ReductionContext::with_steps(1000);
    check("ADD 2 3 reduces to 5", alpha_equiv(&reduce_to_normal_form(&sum, &mut ctx), &five));
    let mut ctx = ReductionContext::with_steps(100);
    reduce_to_normal_form(&church::omega(), &mut ctx);
    check("Omega times out", ctx.timeout);

    // Kernel
    let ok = Kernel::boot(KernelConfig::default(), Box::new(BufferConsole::new())).is_ok_and(|mut k| {
        let Ok(pid) = k.create_process("user", Some(KERNEL_PID)) else { return false };
        k.schedule();
        let before = k.stats().failed_syscalls;
        k.current() == Some(pid)
            && k.dispatch(tritos::kernel::nr::SET_QUANTUM as i64, [1, 0, 0, 0, 0, 0]) == Trit::N
            && k.stats().failed_syscalls == before + 1
    });
    check("Privileged syscall denied to user process", ok);

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
