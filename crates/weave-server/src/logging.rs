use std::io::Write;

use log::LevelFilter;

/// Initialise env_logger with a compact format. Debug mode raises our own
/// crates to debug while keeping dependencies at info.
pub fn init_logging(debug: bool) {
    let own_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter_module("weave_server", own_level)
        .filter_module("weave_core", own_level)
        .filter_module("weave_agent", own_level)
        .filter_module("weave_llm", own_level)
        .filter_module("weave_judge", own_level)
        .filter_module("weave_trace", own_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    let _ = builder.try_init();
}
