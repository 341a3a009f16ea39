use novecrm_core::db::{open_db, open_db_in_memory};
use novecrm_core::{
    AccountStore, ComposeMode, CrmError, LifecycleError, LifecycleState, NewUser, PendingFile,
    RecordLifecycle, RecordQuery, RecordStore, Session, SqliteKeyValueRepository, Status,
    ValidationError,
};
use rusqlite::Connection;

fn sign_in(conn: &Connection) -> Session {
    let accounts = AccountStore::new(SqliteKeyValueRepository::try_new(conn).unwrap());
    accounts
        .register_user(NewUser::new("Ana", None, "ana", "1234"))
        .unwrap();
    accounts.authenticate("ana", "1234").unwrap()
}

fn lifecycle(conn: &Connection) -> RecordLifecycle<SqliteKeyValueRepository<'_>> {
    let session = sign_in(conn);
    let store = RecordStore::new(SqliteKeyValueRepository::try_new(conn).unwrap());
    RecordLifecycle::new(session, store)
}

fn file(name: &str) -> PendingFile {
    PendingFile::new(name, "image/jpeg", vec![1, 2, 3])
}

#[test]
fn create_save_view_and_back() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);
    assert_eq!(crm.state(), LifecycleState::Browsing);

    crm.request_create().unwrap();
    assert_eq!(crm.state(), LifecycleState::Composing(ComposeMode::New));
    crm.draft_mut().unwrap().cliente = "Maria".to_string();
    let saved = crm.save().unwrap();

    assert_eq!(crm.state(), LifecycleState::Viewing(saved.id));
    assert_eq!(crm.current_record().map(|r| r.id), Some(saved.id));
    assert_eq!(crm.records().len(), 1);

    crm.back().unwrap();
    assert_eq!(crm.state(), LifecycleState::Browsing);
    assert!(crm.current_record().is_none());
}

#[test]
fn invalid_transitions_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    assert!(matches!(
        crm.request_edit().unwrap_err(),
        LifecycleError::InvalidTransition {
            from: LifecycleState::Browsing,
            ..
        }
    ));
    assert!(matches!(
        crm.save().unwrap_err(),
        LifecycleError::InvalidTransition { .. }
    ));
    assert!(matches!(
        crm.delete().unwrap_err(),
        LifecycleError::InvalidTransition { .. }
    ));
    assert!(matches!(
        crm.open(uuid::Uuid::new_v4()).unwrap_err(),
        LifecycleError::RecordNotFound(_)
    ));

    crm.request_create().unwrap();
    assert!(matches!(
        crm.request_create().unwrap_err(),
        LifecycleError::InvalidTransition { .. }
    ));
}

#[test]
fn failed_validation_keeps_composition_open_and_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    let attached = crm.attach_files(vec![file("a.jpg")]).unwrap();
    let err = crm.save().unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Crm(CrmError::Validation(ValidationError::MissingField("cliente")))
    ));
    assert_eq!(crm.state(), LifecycleState::Composing(ComposeMode::New));
    assert!(crm.registry().is_live(attached[0].id));
    assert!(crm.records().is_empty());
}

#[test]
fn cancel_releases_handles_acquired_while_composing() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    let attached = crm.attach_files(vec![file("a.jpg"), file("b.jpg")]).unwrap();
    assert_eq!(crm.cancel().unwrap(), 2);

    assert_eq!(crm.state(), LifecycleState::Browsing);
    assert!(crm.records().is_empty());
    for attachment in &attached {
        assert!(matches!(
            crm.open_attachment(attachment).unwrap_err(),
            LifecycleError::Crm(CrmError::HandleUnavailable(id)) if id == attachment.id
        ));
    }
}

#[test]
fn cancelled_edit_keeps_saved_attachments_live() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    crm.draft_mut().unwrap().cliente = "Cliente X".to_string();
    let original = crm.attach_files(vec![file("rg.jpg")]).unwrap().remove(0);
    let saved = crm.save().unwrap();

    crm.request_edit().unwrap();
    assert_eq!(crm.state(), LifecycleState::Composing(ComposeMode::Edit(saved.id)));
    assert!(crm.remove_attachment(original.id).unwrap());
    let extra = crm.attach_files(vec![file("cpf.jpg")]).unwrap().remove(0);
    assert_eq!(crm.cancel().unwrap(), 1);

    assert_eq!(crm.state(), LifecycleState::Viewing(saved.id));
    assert!(crm.registry().is_live(original.id));
    assert!(!crm.registry().is_live(extra.id));
    let viewed = crm.current_record().unwrap();
    assert_eq!(viewed.attachments.len(), 1);
    assert_eq!(&*crm.open_attachment(&viewed.attachments[0]).unwrap(), &[1u8, 2, 3][..]);
}

#[test]
fn saved_edit_releases_dropped_attachments() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    crm.draft_mut().unwrap().cliente = "Cliente X".to_string();
    let attached = crm.attach_files(vec![file("a.jpg"), file("b.jpg")]).unwrap();
    let saved = crm.save().unwrap();
    assert_eq!(saved.attachments.len(), 2);

    crm.request_edit().unwrap();
    crm.remove_attachment(attached[1].id).unwrap();
    // Still live until the edit is saved.
    assert!(crm.registry().is_live(attached[1].id));
    crm.draft_mut().unwrap().status = Status::SinalizacaoPositiva;
    let edited = crm.save().unwrap();

    assert_eq!(edited.created_at, saved.created_at);
    assert_eq!(edited.attachments.len(), 1);
    assert!(crm.registry().is_live(attached[0].id));
    assert!(!crm.registry().is_live(attached[1].id));
}

#[test]
fn new_attachments_are_prepended_to_the_draft() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    crm.attach_files(vec![file("first.jpg")]).unwrap();
    crm.attach_files(vec![file("second.jpg")]).unwrap();
    let names: Vec<_> = crm
        .draft()
        .unwrap()
        .attachments
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, vec!["second.jpg", "first.jpg"]);
}

#[test]
fn delete_releases_handles_then_removes_record() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    crm.draft_mut().unwrap().cliente = "Cliente X".to_string();
    crm.attach_files(vec![file("a.jpg"), file("b.jpg")]).unwrap();
    let saved = crm.save().unwrap();

    crm.delete().unwrap();
    assert_eq!(crm.state(), LifecycleState::Browsing);
    assert!(crm.records().is_empty());
    assert_eq!(crm.registry().live_count(), 0);
    for attachment in &saved.attachments {
        assert!(crm.open_attachment(attachment).is_err());
    }
}

#[test]
fn failed_delete_keeps_record_but_its_files_stay_released() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    crm.request_create().unwrap();
    crm.draft_mut().unwrap().cliente = "Cliente X".to_string();
    crm.attach_files(vec![file("a.jpg")]).unwrap();
    let saved = crm.save().unwrap();

    conn.execute_batch(
        "CREATE TRIGGER kv_no_insert BEFORE INSERT ON kv_entries
         BEGIN SELECT RAISE(ABORT, 'medium is read-only'); END;
         CREATE TRIGGER kv_no_update BEFORE UPDATE ON kv_entries
         BEGIN SELECT RAISE(ABORT, 'medium is read-only'); END;",
    )
    .unwrap();

    assert!(matches!(
        crm.delete().unwrap_err(),
        LifecycleError::Crm(CrmError::StorageUnavailable(_))
    ));
    assert_eq!(crm.state(), LifecycleState::Viewing(saved.id));
    assert_eq!(crm.records().len(), 1);
    assert_eq!(crm.registry().live_count(), 0);
    let attachment = &crm.records()[0].attachments[0];
    assert!(!attachment.has_handle());
    assert!(matches!(
        crm.open_attachment(attachment).unwrap_err(),
        LifecycleError::Crm(CrmError::HandleUnavailable(id)) if id == saved.attachments[0].id
    ));
}

#[test]
fn browse_and_export_follow_the_query() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);

    for (cliente, status) in [
        ("Maria", Status::EmNegociacao),
        ("João", Status::SinalizacaoPositiva),
    ] {
        crm.request_create().unwrap();
        let draft = crm.draft_mut().unwrap();
        draft.cliente = cliente.to_string();
        draft.status = status;
        crm.save().unwrap();
        crm.back().unwrap();
    }

    let positive = RecordQuery::default().status(Status::SinalizacaoPositiva);
    let hits = crm.browse(&positive);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].cliente, "João");

    let rows = crm.export_rows(&RecordQuery::default());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], "João");
}

#[test]
fn attachment_metadata_survives_restart_but_handles_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("novecrm.sqlite3");

    let saved = {
        let conn = open_db(&path).unwrap();
        let mut crm = lifecycle(&conn);
        crm.request_create().unwrap();
        crm.draft_mut().unwrap().cliente = "Cliente X".to_string();
        crm.attach_files(vec![file("contrato.jpg")]).unwrap();
        crm.save().unwrap()
    };

    let conn = open_db(&path).unwrap();
    let session = AccountStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap())
        .authenticate("ana", "1234")
        .unwrap();
    let store = RecordStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());
    let mut crm = RecordLifecycle::new(session, store);

    crm.open(saved.id).unwrap();
    let restored = crm.current_record().unwrap().attachments[0].clone();
    assert_eq!(restored.name, "contrato.jpg");
    assert_eq!(restored.size_bytes, 3);
    assert!(!restored.has_handle());
    assert!(matches!(
        crm.open_attachment(&restored).unwrap_err(),
        LifecycleError::Crm(CrmError::HandleUnavailable(_))
    ));
}

#[test]
fn signing_back_in_reuses_live_handles() {
    let conn = open_db_in_memory().unwrap();
    let mut crm = lifecycle(&conn);
    let session = crm.session().clone();

    crm.request_create().unwrap();
    crm.draft_mut().unwrap().cliente = "Cliente X".to_string();
    crm.attach_files(vec![file("rg.jpg")]).unwrap();
    let saved = crm.save().unwrap();

    crm.request_edit().unwrap();
    let abandoned = crm.attach_files(vec![file("rascunho.jpg")]).unwrap().remove(0);
    let registry = crm.into_registry();
    assert!(!registry.is_live(abandoned.id));
    assert!(registry.is_live(saved.attachments[0].id));

    let store = RecordStore::new(SqliteKeyValueRepository::try_new(&conn).unwrap());
    let mut crm = RecordLifecycle::with_registry(session, store, registry);
    crm.open(saved.id).unwrap();
    let attachment = crm.current_record().unwrap().attachments[0].clone();
    assert!(attachment.has_handle());
    assert!(crm.open_attachment(&attachment).is_ok());
}
