//! Drives a tray menu from several threads against the in-memory toolkit.
//!
//! Pass an image path as the first argument to use it as the "Settings" icon.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tray_menu::headless::HeadlessToolkit;
use tray_menu::{
    ItemTemplate, MenuTemplate, SubmenuTemplate, TrayMenu, TrayMenuAttributes, TrayMenuEvent,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let icon = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => demos::load_icon(&path)?,
        None => demos::solid_icon([0x33, 0x99, 0xff, 0xff], 16),
    };

    let toolkit = Arc::new(HeadlessToolkit::new());
    let menu = TrayMenu::new(
        toolkit.clone(),
        TrayMenuAttributes::default()
            .with_dispatch_timeout(Duration::from_secs(2))
            .with_menu(vec![
                ItemTemplate::new("Open")
                    .action(|entry| info!(label = %entry.label(), "open clicked"))
                    .into(),
                ItemTemplate::new("Settings").icon(icon).into(),
                MenuTemplate::Separator,
                SubmenuTemplate::new(
                    "Mode",
                    vec![
                        ItemTemplate::new("Option A").into(),
                        ItemTemplate::new("Option B").enabled(false).into(),
                    ],
                )
                .into(),
            ]),
    )?;

    // Background producers editing the menu while the host keeps using it.
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let root = menu.root();
            thread::spawn(move || -> anyhow::Result<()> {
                let recent = root
                    .add_submenu("Recent", None)
                    .context("failed to add recent submenu")?;
                for i in 0..3 {
                    recent.add_entry(&format!("file-{worker}-{i}.txt"), None, None)?;
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        match worker.join() {
            Ok(result) => result?,
            Err(_) => warn!("menu worker panicked"),
        }
    }

    menu.root().add_entry("Quit", None, None)?;

    if let Some(open) = menu.root().get("Open") {
        if let Some(handle) = open.native_handle() {
            menu.activate(handle);
        }
    }

    while let Ok(event) = menu.try_recv() {
        match event {
            TrayMenuEvent::RootRebuilt { container } => {
                info!(?container, "root menu rebuilt, re-registering with indicator");
            }
            TrayMenuEvent::Activated { id, label } => info!(?id, %label, "entry activated"),
            _ => {}
        }
    }

    if let Some(root) = menu.root_native_container() {
        info!(labels = ?toolkit.labels(root), "final root menu");
    }
    if let Some(recent) = menu.root().get("Recent").and_then(|e| e.submenu()) {
        info!(entries = recent.len(), "recent submenu");
    }

    menu.shutdown()?;
    let faults = toolkit.faults();
    if !faults.is_empty() {
        anyhow::bail!("toolkit reported faults: {faults:?}");
    }
    info!(native_calls = toolkit.call_count(), "done");
    Ok(())
}
