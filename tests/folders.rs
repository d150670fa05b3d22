#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use cloud_drive::access::{AccessControl, AccessDecision, ResourceKind};
    use cloud_drive::store::MemoryObjectStore;
    use cloud_drive::{EngineConfig, EngineError, StorageEngine, UploadRequest};
    use uuid::Uuid;

    fn engine() -> (Arc<MemoryObjectStore>, StorageEngine) {
        let store = Arc::new(MemoryObjectStore::new());
        let engine = StorageEngine::new(store.clone(), EngineConfig::default());
        (store, engine)
    }

    /// Collaborator that shares everything with everyone.
    struct GrantEverything;

    #[async_trait]
    impl AccessControl for GrantEverything {
        async fn check_access(
            &self,
            _resource: ResourceKind,
            _resource_id: Uuid,
            _user_id: Uuid,
        ) -> AccessDecision {
            AccessDecision::all()
        }
    }

    fn shared_engine() -> (Arc<MemoryObjectStore>, StorageEngine) {
        let store = Arc::new(MemoryObjectStore::new());
        let engine = StorageEngine::with_access_control(
            store.clone(),
            Arc::new(GrantEverything),
            EngineConfig::default(),
        );
        (store, engine)
    }

    fn request(owner: Uuid, name: &str, folder: Option<Uuid>, data: &[u8]) -> UploadRequest {
        let mut request =
            UploadRequest::new(owner, name, "application/octet-stream", data.to_vec());
        request.folder_id = folder;
        request
    }

    #[tokio::test]
    async fn moving_a_folder_under_its_descendant_is_rejected() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();

        let a = engine.create_folder(owner, "a", None).await.expect("a");
        let b = engine.create_folder(owner, "b", Some(a.id)).await.expect("b");
        let c = engine.create_folder(owner, "c", Some(b.id)).await.expect("c");

        let err = engine.move_folder(a.id, owner, Some(c.id)).await.unwrap_err();
        assert!(matches!(err, EngineError::CircularReference));

        // A's parent is unchanged after the reject.
        let path = engine.folder_path(a.id).await.expect("path");
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].id, a.id);
    }

    #[tokio::test]
    async fn breadcrumbs_run_root_to_leaf() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();

        let docs = engine.create_folder(owner, "docs", None).await.expect("docs");
        let work = engine
            .create_folder(owner, "work", Some(docs.id))
            .await
            .expect("work");
        let q3 = engine
            .create_folder(owner, "q3", Some(work.id))
            .await
            .expect("q3");

        let names: Vec<String> = engine
            .folder_path(q3.id)
            .await
            .expect("path")
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["docs", "work", "q3"]);
    }

    #[tokio::test]
    async fn listing_shows_subfolders_and_files() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();

        let root = engine.create_folder(owner, "root", None).await.expect("root");
        engine
            .create_folder(owner, "child", Some(root.id))
            .await
            .expect("child");
        engine
            .upload(request(owner, "inside.txt", Some(root.id), b"x"))
            .await
            .expect("upload");
        engine
            .upload(request(owner, "loose.txt", None, b"y"))
            .await
            .expect("upload");

        let (folders, files) = engine.list_folder(owner, Some(root.id)).await;
        assert_eq!(folders.len(), 1);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "inside.txt");

        let (root_folders, root_files) = engine.list_folder(owner, None).await;
        assert_eq!(root_folders.len(), 1);
        assert_eq!(root_files.len(), 1);
        assert_eq!(root_files[0].name, "loose.txt");
    }

    #[tokio::test]
    async fn move_file_between_folders() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();

        let src = engine.create_folder(owner, "src", None).await.expect("src");
        let dst = engine.create_folder(owner, "dst", None).await.expect("dst");
        let (file, _) = engine
            .upload(request(owner, "doc.txt", Some(src.id), b"x"))
            .await
            .expect("upload");

        let moved = engine
            .move_file(file.id, owner, Some(dst.id))
            .await
            .expect("move");
        assert_eq!(moved.folder_id, Some(dst.id));

        let (_, src_files) = engine.list_folder(owner, Some(src.id)).await;
        assert!(src_files.is_empty());
        let (_, dst_files) = engine.list_folder(owner, Some(dst.id)).await;
        assert_eq!(dst_files.len(), 1);
    }

    #[tokio::test]
    async fn delete_refuses_non_empty_without_cascade() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();

        let folder = engine.create_folder(owner, "full", None).await.expect("folder");
        engine
            .upload(request(owner, "doc.txt", Some(folder.id), b"x"))
            .await
            .expect("upload");

        let err = engine
            .delete_folder(folder.id, owner, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        // Still listable.
        engine.folder_path(folder.id).await.expect("folder survives");
    }

    #[tokio::test]
    async fn cascade_delete_removes_files_first_and_releases_quota() {
        let (store, engine) = engine();
        let owner = Uuid::new_v4();

        let top = engine.create_folder(owner, "top", None).await.expect("top");
        let nested = engine
            .create_folder(owner, "nested", Some(top.id))
            .await
            .expect("nested");
        engine
            .upload(request(owner, "a.txt", Some(top.id), b"aaaa"))
            .await
            .expect("a");
        engine
            .upload(request(owner, "b.txt", Some(nested.id), b"bbbbbb"))
            .await
            .expect("b");
        assert_eq!(engine.usage(owner).await.0, 10);

        engine
            .delete_folder(top.id, owner, true)
            .await
            .expect("cascade");

        assert_eq!(engine.usage(owner).await.0, 0);
        assert_eq!(store.object_count().await, 0);
        assert!(matches!(
            engine.folder_path(top.id).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            engine.folder_path(nested.id).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(engine.list_files(owner, true).await.is_empty());
    }

    #[tokio::test]
    async fn folder_holding_a_grantee_file_is_not_empty() {
        let (store, engine) = shared_engine();
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();

        let folder = engine.create_folder(owner, "shared", None).await.expect("folder");
        // The write grant lets the guest park a file they own in the
        // owner's folder.
        engine
            .upload(request(guest, "guest.txt", Some(folder.id), b"guest bytes"))
            .await
            .expect("guest upload");

        let (_, files) = engine.list_folder(owner, Some(folder.id)).await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].owner_id, guest);

        let err = engine
            .delete_folder(folder.id, owner, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        engine.folder_path(folder.id).await.expect("folder survives");

        // Cascade removes the guest's file too and settles their quota.
        engine
            .delete_folder(folder.id, owner, true)
            .await
            .expect("cascade");
        assert_eq!(engine.usage(guest).await.0, 0);
        assert_eq!(store.object_count().await, 0);
        assert!(engine.list_files(guest, true).await.is_empty());
        assert!(matches!(
            engine.folder_path(folder.id).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn empty_folder_deletes_without_cascade() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();
        let folder = engine.create_folder(owner, "empty", None).await.expect("folder");
        engine
            .delete_folder(folder.id, owner, false)
            .await
            .expect("delete");
        assert!(matches!(
            engine.folder_path(folder.id).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn strangers_cannot_touch_foreign_folders() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let folder = engine.create_folder(owner, "mine", None).await.expect("folder");

        assert!(matches!(
            engine.create_folder(stranger, "intruder", Some(folder.id)).await,
            Err(EngineError::AccessDenied)
        ));
        assert!(matches!(
            engine.move_folder(folder.id, stranger, None).await,
            Err(EngineError::AccessDenied)
        ));
        assert!(matches!(
            engine.delete_folder(folder.id, stranger, true).await,
            Err(EngineError::AccessDenied)
        ));
        assert!(matches!(
            engine
                .upload(request(stranger, "drop.txt", Some(folder.id), b"x"))
                .await,
            Err(EngineError::AccessDenied)
        ));
    }

    #[tokio::test]
    async fn tree_lists_parents_before_children() {
        let (_store, engine) = engine();
        let owner = Uuid::new_v4();

        let a = engine.create_folder(owner, "a", None).await.expect("a");
        let b = engine.create_folder(owner, "b", Some(a.id)).await.expect("b");
        let c = engine.create_folder(owner, "c", Some(b.id)).await.expect("c");

        let tree = engine.folder_tree(owner).await;
        assert_eq!(tree.len(), 3);
        let pos = |id| tree.iter().position(|f| f.id == id).unwrap();
        assert!(pos(a.id) < pos(b.id));
        assert!(pos(b.id) < pos(c.id));
    }
}
