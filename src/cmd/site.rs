//! `ptsite build-site`.

use anyhow::Result;
use console::style;
use ptsite::site::build_site;

use super::{load_toml, resolve_out_dir};
use crate::Cli;

pub fn cmd_build_site(cli: &Cli) -> Result<()> {
    let out_dir = resolve_out_dir(cli)?;
    let dist_dir = load_toml(cli)?.run.dist_dir;

    let report = build_site(&out_dir, &dist_dir)?;

    println!(
        "{} {} page(s) in {}",
        style("Built").green().bold(),
        report.pages.len(),
        report.dist_dir.display()
    );
    for (slug, name) in &report.pages {
        println!("  {}.html  {}", slug, name);
    }
    Ok(())
}
