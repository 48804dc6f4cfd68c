use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::timeout;

use mdoc_holder::document::{CredentialFactory, DocumentStore, Error, EventType};
use mdoc_holder::secure_area::{self, SecureAreaRepository, SoftwareSecureArea};
use mdoc_holder::storage::{self, EphemeralStorage, FileStorage, Storage, StorageTableSpec};

mod common;

const STALL: Duration = Duration::from_millis(50);

fn stalling_store() -> (DocumentStore, common::StallingStorage) {
    let storage = common::StallingStorage::new(Arc::new(EphemeralStorage::new()));
    (common::store_on(Arc::new(storage.clone())), storage)
}

#[tokio::test]
async fn lookups_return_the_same_instance() -> Result<()> {
    let (store, storage) = common::ephemeral_store();
    let document = store.create_document("mdl").await?;
    store.add_document(document.clone()).await?;

    let first = store.lookup_document("mdl").await?.expect("document exists");
    let second = store.lookup_document("mdl").await?.expect("document exists");
    assert!(Arc::ptr_eq(&first, &document));
    assert!(Arc::ptr_eq(&first, &second));

    // A second store on the same storage reconstructs its own instance.
    let other = common::store_on(storage);
    let reloaded = other.lookup_document("mdl").await?.expect("document exists");
    assert!(!Arc::ptr_eq(&reloaded, &document));
    assert!(Arc::ptr_eq(
        &reloaded,
        &other.lookup_document("mdl").await?.expect("document exists")
    ));

    store.delete_document("mdl").await?;
    assert!(store.lookup_document("mdl").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn create_replaces_an_existing_document() -> Result<()> {
    let (store, storage) = common::ephemeral_store();
    let old = store.create_document("mdl").await?;
    common::provision(&old).await?;
    store.add_document(old.clone()).await?;
    assert_eq!(common::key_count(&storage).await?, 1);

    let mut events = store.event_flow();
    let new = store.create_document("mdl").await?;

    let event = events.recv().await?;
    assert_eq!(event.event_type, EventType::Deleted);
    assert!(Arc::ptr_eq(&event.document, &old));
    assert!(store.lookup_document("mdl").await?.is_none());
    assert!(store.list_documents().await?.is_empty());
    assert_eq!(common::key_count(&storage).await?, 0);
    assert!(new.credentials().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn events_follow_the_document_lifecycle() -> Result<()> {
    let (store, _) = common::ephemeral_store();
    let mut events = store.event_flow();

    let document = store.create_document("mdl").await?;
    store.add_document(document.clone()).await?;
    document.set_display_name(Some("Driving licence".into())).await?;
    document.set_provisioned(true).await?;
    store.delete_document("mdl").await?;
    document.set_display_name(Some("after deletion".into())).await?;

    let mut seen = vec![];
    loop {
        match events.try_recv() {
            Ok(event) => {
                assert!(Arc::ptr_eq(&event.document, &document));
                seen.push(event.event_type);
            }
            Err(TryRecvError::Empty) => break,
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(
        seen,
        vec![
            EventType::Added,
            EventType::Updated,
            EventType::Updated,
            EventType::Deleted
        ]
    );
    Ok(())
}

#[tokio::test]
async fn transient_documents_are_silent() -> Result<()> {
    let (store, _) = common::ephemeral_store();
    let mut events = store.event_flow();

    let document = store.create_document("mdl").await?;
    document.set_display_name(Some("Driving licence".into())).await?;
    common::provision(&document).await?;

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(store.lookup_document("mdl").await?.is_none());
    assert!(store.list_documents().await?.is_empty());

    // Changes made before the commit are part of it.
    store.add_document(document.clone()).await?;
    let other = store.clone();
    let found = other.lookup_document("mdl").await?.expect("document exists");
    assert_eq!(
        found.metadata().await.display_name.as_deref(),
        Some("Driving licence")
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_create_and_add_leave_one_document() -> Result<()> {
    let (store, storage) = common::ephemeral_store();

    let tasks = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let document = store.create_document("x").await?;
                common::provision(&document).await?;
                store.add_document(document).await?;
                anyhow::Ok(())
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await??;
    }

    assert_eq!(store.list_documents().await?, vec!["x".to_string()]);
    let survivor = store.lookup_document("x").await?.expect("document exists");
    assert_eq!(survivor.credentials().await.len(), 1);
    assert_eq!(common::key_count(&storage).await?, 1);
    Ok(())
}

#[tokio::test]
async fn storage_errors_propagate() {
    let store = common::store_on(Arc::new(common::UnavailableStorage));
    let expected = Error::Storage(storage::Error::Io("device storage unavailable".into()));

    assert_eq!(store.lookup_document("mdl").await.unwrap_err(), expected);
    assert_eq!(store.list_documents().await.unwrap_err(), expected);
    assert_eq!(store.delete_document("mdl").await.unwrap_err(), expected);
}

#[tokio::test]
async fn deleting_a_document_deletes_its_keys() -> Result<()> {
    let (store, _) = common::ephemeral_store();
    let document = store.create_document("mdl").await?;
    common::provision(&document).await?;
    store.add_document(document.clone()).await?;

    let credential = document
        .find_credential(common::MDOC_DOMAIN)
        .await
        .expect("certified credential");
    let secure_area = store
        .secure_area_repository()
        .get(SoftwareSecureArea::IDENTIFIER)
        .expect("registered");
    secure_area.key_info(&credential.key_alias).await?;

    store.delete_document("mdl").await?;
    assert_eq!(
        secure_area.key_info(&credential.key_alias).await,
        Err(secure_area::Error::KeyUnavailable(credential.key_alias.clone()))
    );
    Ok(())
}

#[tokio::test]
async fn credentials_are_used_evenly() -> Result<()> {
    let (store, storage) = common::ephemeral_store();
    let document = store.create_document("mdl").await?;
    let first = common::provision(&document).await?;
    let second = common::provision(&document).await?;
    store.add_document(document.clone()).await?;

    let picked = document.find_credential(common::MDOC_DOMAIN).await.expect("credential");
    document.increment_usage_count(picked.identifier).await?;
    let next = document.find_credential(common::MDOC_DOMAIN).await.expect("credential");
    assert_ne!(picked.identifier, next.identifier);
    assert!([first, second].contains(&next.identifier));

    document.delete_credential(first).await?;
    assert_eq!(common::key_count(&storage).await?, 1);
    assert_eq!(
        document.delete_credential(first).await,
        Err(Error::CredentialNotFound(first))
    );
    Ok(())
}

#[tokio::test]
async fn documents_survive_reopening_file_storage() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let identifier = {
        let store = common::store_on(Arc::new(FileStorage::open(dir.path()).await?));
        let document = store.create_document("org.iso.18013.5.1.mDL").await?;
        document.set_display_name(Some("Driving licence".into())).await?;
        document.set_card_art(Some(vec![0x89, 0x50, 0x4e, 0x47])).await?;
        let identifier = common::provision(&document).await?;
        store.add_document(document).await?;
        identifier
    };

    let store = common::store_on(Arc::new(FileStorage::open(dir.path()).await?));
    assert_eq!(
        store.list_documents().await?,
        vec!["org.iso.18013.5.1.mDL".to_string()]
    );
    let document = store
        .lookup_document("org.iso.18013.5.1.mDL")
        .await?
        .expect("document exists");
    let metadata = document.metadata().await;
    assert_eq!(metadata.display_name.as_deref(), Some("Driving licence"));
    assert_eq!(metadata.card_art, Some(vec![0x89, 0x50, 0x4e, 0x47]));
    assert!(metadata.created_at().is_some());

    let credential = document
        .find_credential(common::MDOC_DOMAIN)
        .await
        .expect("credential survives");
    assert_eq!(credential.identifier, identifier);
    assert_eq!(credential.issuer_data.as_deref(), Some(&b"issuer signed"[..]));
    let secure_area = store
        .secure_area_repository()
        .get(&credential.secure_area_identifier)
        .expect("registered");
    assert_eq!(secure_area.sign(&credential.key_alias, b"data").await?.len(), 64);
    Ok(())
}

#[tokio::test]
async fn unknown_credential_types_are_reported() -> Result<()> {
    let (store, storage) = common::ephemeral_store();
    let document = store.create_document("mdl").await?;
    common::provision(&document).await?;
    store.add_document(document).await?;

    let unaware = DocumentStore::new(
        storage.clone(),
        Arc::new(
            SecureAreaRepository::new().with(Arc::new(SoftwareSecureArea::new(storage.clone()))),
        ),
        Arc::new(CredentialFactory::new()),
    );
    assert_eq!(
        unaware.lookup_document("mdl").await.unwrap_err(),
        Error::UnknownCredentialType(mdoc_holder::document::MDOC_CREDENTIAL_TYPE.into())
    );

    unaware.delete_document("mdl").await?;
    assert!(unaware.list_documents().await?.is_empty());
    assert_eq!(common::key_count(&storage).await?, 0);
    Ok(())
}

#[tokio::test]
async fn replacing_an_unknown_credential_type_releases_its_keys() -> Result<()> {
    let (store, storage) = common::ephemeral_store();
    let document = store.create_document("mdl").await?;
    common::provision(&document).await?;
    store.add_document(document).await?;
    assert_eq!(common::key_count(&storage).await?, 1);

    let unaware = DocumentStore::new(
        storage.clone(),
        Arc::new(
            SecureAreaRepository::new().with(Arc::new(SoftwareSecureArea::new(storage.clone()))),
        ),
        Arc::new(CredentialFactory::new()),
    );
    let fresh = unaware.create_document("mdl").await?;
    assert!(unaware.list_documents().await?.is_empty());
    assert_eq!(common::key_count(&storage).await?, 0);

    unaware.add_document(fresh).await?;
    assert_eq!(unaware.list_documents().await?, vec!["mdl".to_string()]);
    Ok(())
}

#[tokio::test]
async fn corrupted_rows_are_typed_errors() -> Result<()> {
    let (store, storage) = common::ephemeral_store();
    storage
        .get_table(&StorageTableSpec::new("Documents"))
        .await?
        .insert("mdl", vec![0xff, 0x00])
        .await?;

    assert!(matches!(
        store.lookup_document("mdl").await,
        Err(Error::Corrupted { name, .. }) if name == "mdl"
    ));

    // A fresh document may take the name over.
    let document = store.create_document("mdl").await?;
    store.add_document(document.clone()).await?;
    let found = store.lookup_document("mdl").await?.expect("document exists");
    assert!(Arc::ptr_eq(&found, &document));
    Ok(())
}

#[tokio::test]
async fn cancelled_add_keeps_the_previous_document_writing_through() -> Result<()> {
    let (store, storage) = stalling_store();
    let current = store.create_document("mdl").await?;
    let replacement = store.create_document("mdl").await?;
    store.add_document(current.clone()).await?;

    storage.stall_inserts(true);
    assert!(timeout(STALL, store.add_document(replacement)).await.is_err());
    storage.stall_inserts(false);

    let cached = store.lookup_document("mdl").await?.expect("document exists");
    assert!(Arc::ptr_eq(&cached, &current));

    let mut events = store.event_flow();
    current.set_display_name(Some("edited".into())).await?;
    assert_eq!(events.recv().await?.event_type, EventType::Updated);

    let other = common::store_on(Arc::new(storage));
    let persisted = other.lookup_document("mdl").await?.expect("document exists");
    assert_eq!(
        persisted.metadata().await.display_name.as_deref(),
        Some("edited")
    );
    Ok(())
}

#[tokio::test]
async fn cancelled_add_of_a_new_document_leaves_nothing() -> Result<()> {
    let (store, storage) = stalling_store();
    let mut events = store.event_flow();
    let document = store.create_document("mdl").await?;

    storage.stall_inserts(true);
    assert!(timeout(STALL, store.add_document(document.clone())).await.is_err());
    storage.stall_inserts(false);

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(store.lookup_document("mdl").await?.is_none());
    assert!(store.list_documents().await?.is_empty());

    // The same instance can still be committed.
    store.add_document(document.clone()).await?;
    let found = store.lookup_document("mdl").await?.expect("document exists");
    assert!(Arc::ptr_eq(&found, &document));
    Ok(())
}

#[tokio::test]
async fn cancelled_delete_is_restored_by_lookup() -> Result<()> {
    let (store, storage) = stalling_store();
    let document = store.create_document("mdl").await?;
    document.set_display_name(Some("Driving licence".into())).await?;
    store.add_document(document.clone()).await?;
    let mut events = store.event_flow();

    storage.stall_deletes(true);
    assert!(timeout(STALL, store.delete_document("mdl")).await.is_err());
    storage.stall_deletes(false);

    let event = events.recv().await?;
    assert_eq!(event.event_type, EventType::Deleted);
    assert!(Arc::ptr_eq(&event.document, &document));

    assert_eq!(store.list_documents().await?, vec!["mdl".to_string()]);
    let restored = store.lookup_document("mdl").await?.expect("row survives");
    assert!(!Arc::ptr_eq(&restored, &document));
    assert_eq!(
        restored.metadata().await.display_name.as_deref(),
        Some("Driving licence")
    );

    store.delete_document("mdl").await?;
    assert!(store.lookup_document("mdl").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn cancelled_create_returns_no_document() -> Result<()> {
    let (store, storage) = stalling_store();
    let existing = store.create_document("mdl").await?;
    store.add_document(existing).await?;

    storage.stall_deletes(true);
    assert!(timeout(STALL, store.create_document("mdl")).await.is_err());
    storage.stall_deletes(false);

    assert!(store.lookup_document("mdl").await?.is_some());

    let fresh = store.create_document("mdl").await?;
    assert!(store.list_documents().await?.is_empty());
    store.add_document(fresh.clone()).await?;
    let found = store.lookup_document("mdl").await?.expect("document exists");
    assert!(Arc::ptr_eq(&found, &fresh));
    Ok(())
}
