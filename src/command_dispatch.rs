//! Purpose: Hold top-level CLI command dispatch for `treewrap`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Helpers in `main.rs` remain the source of command business logic.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "treewrap", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Info { store } => {
            let loaded = MemoryStore::load(&store)?;
            emit_json(store_info_json(&store, &loaded));
            Ok(RunOutcome::ok())
        }
        Command::Dump {
            store,
            chain,
            columns,
            arrays,
            read_all,
            from,
            stop_at,
        } => {
            let primary = MemoryStore::load(&store)?;
            let arrays = arrays
                .iter()
                .map(|spec| parse_array_spec(spec))
                .collect::<Result<Vec<_>, _>>()?;
            let (columns, arrays) = if columns.is_empty() && arrays.is_empty() {
                default_request(&primary)
            } else {
                (columns, arrays)
            };
            let request = DumpRequest {
                label: store.display().to_string(),
                columns,
                arrays,
                read_all,
                from,
                stop_at,
            };

            let printed = if chain.is_empty() {
                let mut primary = primary;
                dump_store(&mut primary, &request, color_mode)?
            } else {
                let mut segments = vec![primary];
                for path in &chain {
                    segments.push(MemoryStore::load(path)?);
                }
                let mut chained = Chain::new(segments)?;
                dump_store(&mut chained, &request, color_mode)?
            };
            tracing::debug!(printed, segments = chain.len() + 1, "dump finished");
            Ok(RunOutcome::ok())
        }
        Command::Fill { store, columns } => {
            let specs = columns
                .iter()
                .map(|spec| parse_column_spec(spec))
                .collect::<Result<Vec<_>, _>>()?;
            if store.exists() {
                return Err(Error::new(ErrorKind::AlreadyExists)
                    .with_message("store file already exists")
                    .with_path(&store)
                    .with_hint("Choose a new path; fill always creates a fresh store."));
            }
            let mut created = MemoryStore::new();
            let written = fill_store(&mut created, &specs, io::stdin().lock())?;
            created.save(&store)?;
            emit_json(json!({
                "path": store.display().to_string(),
                "written": written,
                "entries": created.record_count(),
            }));
            Ok(RunOutcome::ok())
        }
    }
}
