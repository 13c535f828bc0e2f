//! Process-wide logger initialization.
//!
//! Wires the `--log-*` flags into `env_logger`: level, timestamps, source
//! locations, the originating module, and an optional JSON line format.
//! `RUST_LOG` still overrides the level for selective debugging.

use std::io::Write;

use log::LevelFilter;

use crate::app::GlobalOptions;

pub fn init(opts: &GlobalOptions) {
    let level = match opts.log_level.as_str() {
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };

    let show_time = opts.log_time;
    let show_source = opts.log_source;
    let show_func = opts.log_func;
    let use_json = opts.log_json;

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format(move |buf, record| {
            if use_json {
                let mut line = serde_json::Map::new();
                line.insert("level".into(), record.level().to_string().into());
                if show_time {
                    line.insert("time".into(), buf.timestamp().to_string().into());
                }
                if show_source {
                    if let (Some(file), Some(lineno)) = (record.file(), record.line()) {
                        line.insert("source".into(), format!("{file}:{lineno}").into());
                    }
                }
                if show_func {
                    line.insert("module".into(), record.target().into());
                }
                line.insert("msg".into(), record.args().to_string().into());
                writeln!(buf, "{}", serde_json::Value::Object(line))
            } else {
                write!(buf, "{:<5}", record.level())?;
                if show_time {
                    write!(buf, " {}", buf.timestamp())?;
                }
                if show_source {
                    if let (Some(file), Some(lineno)) = (record.file(), record.line()) {
                        write!(buf, " {file}:{lineno}")?;
                    }
                }
                if show_func {
                    write!(buf, " {}", record.target())?;
                }
                writeln!(buf, " {}", record.args())
            }
        })
        .init();
}
