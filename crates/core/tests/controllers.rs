mod common;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use common::{Event, Fixture};
use romvault_core::{
    copy::{DialogResponse, ProgressDialog},
    identity,
    models::{ContentId, ContentStoreInfo, GameInfo, PlayAction, RomKind, SingleFileInfo},
    GameRecord, InstallError, InstallState, LegacyGame, Library, Severity, UninstallState,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Closes itself on the first progress update.
struct ClosingDialog;

impl ProgressDialog for ClosingDialog {
    fn begin(&self, _source: &Path, _target: &Path, _total_bytes: u64) {}

    fn update(&self, _copied_bytes: u64, _total_bytes: u64) -> DialogResponse {
        DialogResponse::Cancel
    }

    fn finish(&self, _completed: bool) {}
}

fn scanned_record(library: &Library) -> GameRecord {
    let games: Vec<_> = library.games(&CancellationToken::new()).collect();
    assert_eq!(games.len(), 1, "expected one game, got {games:?}");
    GameRecord::from(&games[0])
}

#[tokio::test]
async fn completion_notice_follows_the_setting() -> Result<()> {
    let mut fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    fx.write("Mario.nes", b"rom")?;
    fx.config.notify_on_install_complete = true;
    let library = fx.library();

    let controller = library.install_controller(&scanned_record(&library))?;
    controller.install()?;
    assert_eq!(controller.wait().await, InstallState::Installed);

    let events = fx.host.events();
    assert_eq!(
        events[0],
        Event::Notify("Mario has been installed.".to_string(), Severity::Info)
    );
    assert!(matches!(events[1], Event::Installed(_)));
    Ok(())
}

#[tokio::test]
async fn closing_the_dialog_cancels_silently_and_cleans_up() -> Result<()> {
    let mut fx = Fixture::new(RomKind::MultiFile, &["cue"])?;
    fx.write("Zelda/zelda.cue", b"cue")?;
    fx.write("Zelda/zelda.bin", &[7u8; 200_000])?;
    fx.config.use_copy_dialog_in_desktop_mode = true;
    let library = Library::new(Arc::new(
        fx.context().with_dialog(Arc::new(ClosingDialog)),
    ));

    let controller = library.install_controller(&scanned_record(&library))?;
    controller.install()?;
    assert_eq!(controller.wait().await, InstallState::Cancelled);

    assert_eq!(fx.host.events(), vec![Event::Aborted]);
    assert!(!fx.destination.join("Zelda").exists());
    Ok(())
}

#[tokio::test]
async fn copy_failures_are_reported_with_the_game_name() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    let path = fx.write("Mario.nes", b"rom")?;
    let library = fx.library();
    let record = scanned_record(&library);
    std::fs::remove_file(path)?;

    let controller = library.install_controller(&record)?;
    controller.install()?;
    assert!(matches!(controller.wait().await, InstallState::Failed(_)));

    let errors = fx.host.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Failed to install Mario.\n\n"));
    assert_eq!(fx.host.events().last(), Some(&Event::Aborted));
    Ok(())
}

#[tokio::test]
async fn missing_mapping_fails_before_any_work() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    let info = GameInfo::SingleFile(SingleFileInfo {
        mapping_id: Uuid::new_v4(),
        source_path: "Mario.nes".to_string(),
    });
    let record = GameRecord {
        game_id: identity::encode(&info)?,
        name: "Mario".to_string(),
        ..GameRecord::default()
    };

    let controller = fx.library().install_controller(&record)?;
    let err = controller.install().unwrap_err();
    assert!(matches!(err, InstallError::MappingMissing(_)));
    assert!(matches!(controller.state(), InstallState::Failed(_)));
    assert_eq!(fx.host.errors().len(), 1);
    Ok(())
}

#[tokio::test]
async fn uninstall_removes_the_file_then_self_heals() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    fx.write("Mario.nes", b"rom")?;
    let library = fx.library();

    let controller = library.install_controller(&scanned_record(&library))?;
    controller.install()?;
    controller.wait().await;
    let installed = scanned_record(&library);
    assert!(installed.is_installed);

    let uninstall = library.uninstall_controller(&installed)?;
    uninstall.uninstall();
    assert_eq!(uninstall.wait().await, UninstallState::Uninstalled);
    assert!(!fx.destination.join("Mario.nes").exists());
    assert!(fx.source.join("Mario.nes").exists());

    let again = library.uninstall_controller(&installed)?;
    again.uninstall();
    assert_eq!(again.wait().await, UninstallState::Uninstalled);
    let events = fx.host.events();
    assert_eq!(
        events[events.len() - 2],
        Event::Notify(
            "Mario does not appear to be installed. Marking as uninstalled.".to_string(),
            Severity::Info
        )
    );
    assert_eq!(events[events.len() - 1], Event::Uninstalled);
    Ok(())
}

#[tokio::test]
async fn dropping_the_uninstall_controller_keeps_the_game() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    fx.write("Mario.nes", b"rom")?;
    let library = fx.library();

    let controller = library.install_controller(&scanned_record(&library))?;
    controller.install()?;
    assert_eq!(controller.wait().await, InstallState::Installed);
    let installed = scanned_record(&library);

    let uninstall = library.uninstall_controller(&installed)?;
    uninstall.uninstall();
    drop(uninstall);

    for _ in 0..200 {
        if fx.host.events().contains(&Event::UninstallAborted) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let events = fx.host.events();
    assert_eq!(events.last(), Some(&Event::UninstallAborted));
    assert!(!events.contains(&Event::Uninstalled));
    assert!(fx.host.errors().is_empty());
    assert!(fx.destination.join("Mario.nes").is_file());
    Ok(())
}

#[tokio::test]
async fn failed_uninstall_is_reported_and_aborted() -> Result<()> {
    let fx = Fixture::new(RomKind::ContentStore, &[])?;
    let info = GameInfo::ContentStore(ContentStoreInfo {
        mapping_id: Uuid::new_v4(),
        content_id: ContentId(0x100),
    });
    let record = GameRecord {
        game_id: identity::encode(&info)?,
        name: "Zelda".to_string(),
        is_installed: true,
        ..GameRecord::default()
    };

    let uninstall = fx.library().uninstall_controller(&record)?;
    uninstall.uninstall();
    assert!(matches!(uninstall.wait().await, UninstallState::Failed(_)));

    let errors = fx.host.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Failed to uninstall Zelda.\n\n"));
    assert_eq!(fx.host.events().last(), Some(&Event::UninstallAborted));
    Ok(())
}

#[test]
fn legacy_ids_are_migrated_through_the_play_action() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    let mapping = fx.mapping().clone();
    let legacy_id = format!("|{}", fx.source.join("Mario.nes").display());
    let games = vec![
        LegacyGame {
            game_id: legacy_id.clone(),
            play_action: Some(PlayAction {
                name: "Play in Mesen".to_string(),
                emulator_id: mapping.emulator_id,
                emulator_profile_id: mapping.emulator_profile_id.clone(),
            }),
        },
        LegacyGame {
            game_id: "no-extension".to_string(),
            play_action: None,
        },
    ];

    let migrations = fx.library().migrate_legacy_ids(&games);
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].old_id, legacy_id);
    assert_eq!(
        identity::decode(&migrations[0].new_id)?,
        GameInfo::SingleFile(SingleFileInfo {
            mapping_id: mapping.mapping_id,
            source_path: "Mario.nes".to_string(),
        })
    );
    Ok(())
}

#[test]
fn games_with_vanished_sources_are_listed_for_pruning() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    let mario = fx.write("Mario.nes", b"rom")?;
    fx.write("Zelda.nes", b"rom")?;
    let library = fx.library();
    let records: Vec<GameRecord> = library
        .games(&CancellationToken::new())
        .map(|game| GameRecord::from(&game))
        .collect();
    std::fs::remove_file(mario)?;

    let missing = library.games_missing_source(&records, &CancellationToken::new());
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].name, "Mario");

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(library.games_missing_source(&records, &cancelled).is_empty());
    Ok(())
}

#[test]
fn description_lists_payload_and_mapping() -> Result<()> {
    let fx = Fixture::new(RomKind::SingleFile, &["nes"])?;
    fx.write("Mario.nes", b"rom")?;
    let library = fx.library();
    let text = library.describe(&scanned_record(&library));

    assert!(text.starts_with("Game: Mario\n"));
    assert!(text.contains("RomKind: single file (10)"));
    assert!(text.contains("SourcePath: Mario.nes"));
    assert!(text.contains("Mapping Info:"));
    assert!(text.contains(&format!("    MappingId: {}", fx.mapping().mapping_id)));

    let broken = GameRecord {
        game_id: "!1***".to_string(),
        name: "Broken".to_string(),
        ..GameRecord::default()
    };
    assert!(library.describe(&broken).contains("Try removing and re-adding"));
    Ok(())
}

#[tokio::test]
async fn content_titles_install_into_the_store() -> Result<()> {
    let fx = Fixture::new(RomKind::ContentStore, &[])?;
    let descriptor = serde_json::json!({
        "contentId": 256,
        "baseId": 256,
        "role": "program",
        "version": 0,
        "displayVersion": "1.0.0",
        "title": "Zelda",
        "publisher": "Nintendo"
    });
    fx.write("zelda.nsp", b"nsp")?;
    fx.write("zelda.nsp.meta.json", descriptor.to_string().as_bytes())?;
    let library = fx.library();

    let record = scanned_record(&library);
    assert_eq!(record.name, "Zelda");
    assert!(!record.is_installed);

    let controller = library.install_controller(&record)?;
    controller.install()?;
    assert_eq!(controller.wait().await, InstallState::Installed);
    let title_dir = fx.destination.join("0000000000000100");
    assert!(title_dir.join("zelda.nsp").is_file());

    let installed = scanned_record(&library);
    assert!(installed.is_installed);
    assert_eq!(installed.game_id, record.game_id);
    assert_eq!(
        installed.roms[0].path,
        title_dir.join("zelda.nsp").to_string_lossy()
    );

    let uninstall = library.uninstall_controller(&installed)?;
    uninstall.uninstall();
    assert_eq!(uninstall.wait().await, UninstallState::Uninstalled);
    assert!(!title_dir.exists());
    assert!(!scanned_record(&library).is_installed);
    Ok(())
}
