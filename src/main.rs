//! `corevm`: a command-line demo host for `corevm-core`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use corevm_cli::{build_cons_chain, ConsModel, NoCodeHeap};
use corevm_core::object::Cell;
use corevm_core::{primitives, CoreConfig, Vm};

#[derive(Parser)]
#[command(name = "corevm", about = "Demo host for the corevm-core GC and execution-context runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full collection and print the resulting stats.
    Gc,
    /// Run a nursery-only collection and print the resulting stats.
    MinorGc,
    /// Build a small cons chain, collect, and show it survive promotion.
    Demo {
        /// Number of cons cells to chain together.
        #[arg(long, default_value_t = 8)]
        length: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut vm = Vm::new(&CoreConfig::default());
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    match cli.command {
        Command::Gc => {
            primitives::gc(&mut vm, &model, &mut code_heap)?;
            print_stats(&vm);
        }
        Command::MinorGc => {
            primitives::minor_gc(&mut vm, &model, &mut code_heap)?;
            print_stats(&vm);
        }
        Command::Demo { length } => {
            let root = build_cons_chain(&mut vm, length);
            set_demo_root(&mut vm, root);

            tracing::info!(length, "built cons chain in nursery");
            primitives::gc(&mut vm, &model, &mut code_heap)?;

            let root_after = demo_root(&vm);
            let survived = root_after.as_address().is_some();
            tracing::info!(survived, "demo chain root after full gc");
            print_stats(&vm);
        }
    }

    Ok(())
}

const DEMO_ROOT_SLOT: usize = corevm_core::vm::USER_ENV_SLOTS - 1;

fn set_demo_root(vm: &mut Vm, root: Cell) {
    vm.set_user_env(DEMO_ROOT_SLOT, root);
}

fn demo_root(vm: &Vm) -> Cell {
    vm.user_env(DEMO_ROOT_SLOT)
}

fn print_stats(vm: &Vm) {
    let stats = primitives::gc_stats(vm);
    for kind in [
        corevm_core::generation::GenKind::Nursery,
        corevm_core::generation::GenKind::Aging,
        corevm_core::generation::GenKind::Tenured,
    ] {
        let gen_stats = stats.generation(kind);
        println!(
            "{kind:?}: collections={} objects={} bytes_copied={} max_micros={}",
            gen_stats.collections, gen_stats.object_count, gen_stats.bytes_copied, gen_stats.max_gc_time_micros
        );
    }
    println!("cards_scanned={} decks_scanned={}", stats.cards_scanned, stats.decks_scanned);
}
