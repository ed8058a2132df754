use anyhow::{Context, Result};
use modstage::access::Access;
use modstage::logging;
use modstage::model::ModVariant;
use std::path::Path;

fn main() -> Result<()> {
    logging::init_logging();

    let mut args = std::env::args().skip(1).peekable();
    let mut install_paths = Vec::new();
    let mut enable_ids = Vec::new();
    let mut disable_ids = Vec::new();
    let mut list = false;
    let mut check_versions = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--install" | "-i" => {
                if let Some(path) = args.next() {
                    install_paths.push(path);
                } else {
                    eprintln!("--install requires a path");
                }
            }
            "--enable" => {
                if let Some(id) = args.next() {
                    enable_ids.push(id);
                } else {
                    eprintln!("--enable requires a mod id");
                }
            }
            "--disable" => {
                if let Some(id) = args.next() {
                    disable_ids.push(id);
                } else {
                    eprintln!("--disable requires a mod id");
                }
            }
            "--list" | "-l" | "--reload" => list = true,
            "--check-versions" => check_versions = true,
            "--help" | "-h" => {
                println!("modstage");
                println!("  --install <path>     Install a mod archive/folder into the archive store");
                println!("  --enable <mod_id>    Stage and activate the highest version of a mod");
                println!("  --disable <mod_id>   Move a mod's active variant back to staging");
                println!("  --check-versions     Fetch remote version files now");
                println!("  --list               Re-scan and print the mod list (default)");
                return Ok(());
            }
            other => eprintln!("unknown argument: {other}"),
        }
    }

    let no_actions =
        install_paths.is_empty() && enable_ids.is_empty() && disable_ids.is_empty() && !check_versions;
    if no_actions {
        list = true;
    }

    let access = Access::from_config()?;
    access.reload(None);

    for path in install_paths {
        let installed = access.install_from_unknown_source(Path::new(&path))?;
        println!("Installed {path} -> {installed:?}");
    }
    for id in enable_ids {
        enable_mod(&access, &id)?;
    }
    for id in disable_ids {
        disable_mod(&access, &id)?;
    }
    if check_versions {
        let fetched = access.check_for_mod_updates(true)?;
        println!("Fetched {fetched} remote version file(s)");
    }
    if list {
        print_mod_list(&access);
    }
    Ok(())
}

fn enable_mod(access: &Access, mod_id: &str) -> Result<()> {
    let target_id = {
        let list = access.mods().context("no mod list loaded")?;
        let subject = list
            .mod_by_id(mod_id)
            .with_context(|| format!("no mod with id '{mod_id}'"))?;
        let target = subject
            .find_highest_version()
            .with_context(|| format!("mod '{mod_id}' has no variants"))?;
        if target.staging_info.is_none() && target.mods_folder_info.is_none() {
            access.stage(target)?;
        }
        target.smol_id()
    };

    // stage() refreshed the snapshot; pick the variant back up with its
    // current location markers.
    let list = access.mods().context("no mod list loaded")?;
    let subject = list
        .mod_by_id(mod_id)
        .with_context(|| format!("no mod with id '{mod_id}'"))?;
    let target = subject
        .variant_by_smol_id(&target_id)
        .with_context(|| format!("variant {target_id} disappeared during staging"))?;
    access.change_active_variant(subject, Some(target))?;
    println!("Enabled {mod_id} {}", target.mod_info.version);
    Ok(())
}

fn disable_mod(access: &Access, mod_id: &str) -> Result<()> {
    let list = access.mods().context("no mod list loaded")?;
    let subject = list
        .mod_by_id(mod_id)
        .with_context(|| format!("no mod with id '{mod_id}'"))?;
    access.change_active_variant(subject, None)?;
    println!("Disabled {mod_id}");
    Ok(())
}

fn print_mod_list(access: &Access) {
    let Some(list) = access.mods() else {
        println!("No mods found");
        return;
    };
    for m in &list.mods {
        let state = if m.has_enabled_variant() {
            "enabled"
        } else if m.is_enabled_in_game {
            "listed but not present"
        } else {
            "disabled"
        };
        println!("{} ({state})", m.id);
        for variant in &m.variants {
            let online = access
                .get_online_version(&m.id)
                .and_then(|info| info.mod_version)
                .map(|version| format!("  [online: {version}]"))
                .unwrap_or_default();
            println!(
                "  {} {}{online}",
                variant.mod_info.version,
                locations(variant)
            );
        }
    }
}

fn locations(variant: &ModVariant) -> String {
    let mut markers = String::new();
    if variant.mods_folder_info.is_some() {
        markers.push('M');
    }
    if variant.staging_info.is_some() {
        markers.push('S');
    }
    if variant.archive_info.is_some() {
        markers.push('A');
    }
    format!("[{markers}]")
}
