use std::path::{Path, PathBuf};

use anyhow::Context as _;
use log::info;

use spir::ir::format;

pub fn run(inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
    let mut iter = inputs.iter();
    let first = iter.next().context("at least one input is required")?;
    let mut tu = format::read_unit_from_path(first)
        .with_context(|| format!("loading {}", first.display()))?;

    for path in iter {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        format::read_unit_into(&mut tu, &data)
            .with_context(|| format!("linking {}", path.display()))?;
        info!("linked {}", path.display());
    }

    format::write_unit_to_path(&tu, output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("linked {} inputs into {}", inputs.len(), output.display());
    Ok(())
}
