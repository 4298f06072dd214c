//! Nested Set Scenario Tests
//!
//! End-to-end checks of the maintainer against a real database file: the
//! admin scenarios (move, delete with reassignment, reorder), delete safety,
//! reset round trip, count conservation and permission enforcement.

#[cfg(test)]
mod nested_set_scenario_tests {
    use anyhow::Result;
    use category_tree_core::config::TreeConfig;
    use category_tree_core::db::CategoryDatabase;
    use category_tree_core::models::{CategoryId, TenantId, UserId};
    use category_tree_core::operations::{ConflictRetry, OrderPlan, PlanStep};
    use category_tree_core::services::{
        CategoryAdmin, CategoryTree, CategoryTreeError, StaticPermissions, TreeContext, APPEND,
    };
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::task::JoinHandle;

    struct Sample {
        a: CategoryId,
        b: CategoryId,
        c: CategoryId,
        d: CategoryId,
        e: CategoryId,
    }

    async fn create_admin() -> Result<(CategoryAdmin, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = CategoryDatabase::new(temp_dir.path().join("test.db")).await?;
        let ctx = TreeContext::new(db, TreeConfig::default());
        Ok((CategoryAdmin::new(ctx), temp_dir))
    }

    fn tenant() -> TenantId {
        TenantId::from("blog")
    }

    fn user() -> UserId {
        UserId::from("admin")
    }

    /// A(1,10) > [B(2,5) > D(3,4), C(6,9) > E(7,8)]
    async fn create_sample(admin: &CategoryAdmin) -> Result<Sample> {
        create_sample_in(admin, &tenant()).await
    }

    async fn create_sample_in(admin: &CategoryAdmin, t: &TenantId) -> Result<Sample> {
        let (t, u) = (t.clone(), user());
        let a = admin.add(&t, &u, None, "A", "").await?;
        let b = admin.add(&t, &u, Some(&a), "B", "").await?;
        let c = admin.add(&t, &u, Some(&a), "C", "").await?;
        let d = admin.add(&t, &u, Some(&b), "D", "").await?;
        let e = admin.add(&t, &u, Some(&c), "E", "").await?;
        Ok(Sample { a, b, c, d, e })
    }

    fn titles(tree: &CategoryTree) -> Vec<String> {
        tree.iter().map(|e| e.category.title.clone()).collect()
    }

    /// Every (ancestor, descendant) pair by title
    fn relations(tree: &CategoryTree) -> BTreeSet<(String, String)> {
        tree.categories()
            .iter()
            .flat_map(|c| {
                tree.ancestors_of(&c.id)
                    .into_iter()
                    .map(move |a| (a.title.clone(), c.title.clone()))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_sample_bounds() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;

        let tree = admin.tree(&tenant()).await?;
        let bounds = |id: &CategoryId| {
            let c = tree.find(id).unwrap();
            (c.lft, c.rgt, c.level)
        };
        assert_eq!(bounds(&s.a), (1, 10, 0));
        assert_eq!(bounds(&s.b), (2, 5, 1));
        assert_eq!(bounds(&s.d), (3, 4, 2));
        assert_eq!(bounds(&s.c), (6, 9, 1));
        assert_eq!(bounds(&s.e), (7, 8, 2));
        assert_eq!(titles(&tree), vec!["A", "B", "D", "C", "E"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_subtree_under_sibling_at_front() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;

        admin
            .maintainer()
            .move_subtree(&tenant(), &user(), &s.b, Some(&s.c), 0)
            .await?;

        let tree = admin.tree(&tenant()).await?;
        assert_eq!(titles(&tree), vec!["A", "C", "B", "D", "E"]);

        let b = tree.find(&s.b).unwrap();
        let c = tree.find(&s.c).unwrap();
        assert!(c.contains(b));
        assert_eq!(b.level, 2);
        assert_eq!(tree.find(&s.d).unwrap().level, 3);
        assert_eq!(tree.parent_of(&s.b).map(|p| p.id.clone()), Some(s.c.clone()));
        assert_eq!(tree.find(&s.a).unwrap().width(), 10);

        let report = tree.check_integrity();
        assert!(report.is_consistent(), "{:?}", report.violations);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_subtree_appends_past_end() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;

        admin
            .maintainer()
            .move_subtree(&tenant(), &user(), &s.b, Some(&s.c), APPEND)
            .await?;

        let tree = admin.tree(&tenant()).await?;
        assert_eq!(titles(&tree), vec!["A", "C", "E", "B", "D"]);
        assert!(tree.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_into_own_descendant_is_rejected() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let before = admin.tree(&tenant()).await?;

        let err = admin
            .maintainer()
            .move_subtree(&tenant(), &user(), &s.a, Some(&s.d), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryTreeError::CycleRejected { .. }));

        let after = admin.tree(&tenant()).await?;
        assert_eq!(before.categories(), after.categories());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_reassigns_content_and_closes_gap() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());

        for i in 0..3 {
            admin
                .assign_item(&t, &u, &format!("post-{}", i), "Post", Some(&s.b))
                .await?;
        }
        let before = admin.tree(&t).await?;
        let a_total = before.find(&s.a).unwrap().total_count;
        let c_direct = before.find(&s.c).unwrap().direct_count;
        let b_width = before.find(&s.b).unwrap().width();
        let max_rgt = before.categories().iter().map(|c| c.rgt).max().unwrap();
        assert_eq!(a_total, 3);

        let summary = admin.delete(&t, &u, &s.b, Some(&s.c), false).await?;
        assert_eq!(summary.removed_categories, 2);
        assert_eq!(summary.reassigned_items, 3);

        let after = admin.tree(&t).await?;
        assert!(after.find(&s.b).is_none());
        assert!(after.find(&s.d).is_none());
        assert_eq!(after.find(&s.c).unwrap().direct_count, c_direct + 3);
        assert_eq!(after.find(&s.a).unwrap().total_count, a_total);
        assert_eq!(
            after.categories().iter().map(|c| c.rgt).max().unwrap(),
            max_rgt - b_width
        );

        let report = after.check_integrity();
        assert!(report.is_consistent(), "{:?}", report.violations);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_without_target_uncategorizes_content() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());

        admin.assign_item(&t, &u, "post-1", "Post", Some(&s.d)).await?;
        admin.delete(&t, &u, &s.b, None, false).await?;

        let uncategorized = admin.items(&t, None).await?;
        assert_eq!(uncategorized.len(), 1);
        assert_eq!(uncategorized[0].id, "post-1");

        let tree = admin.tree(&t).await?;
        assert_eq!(tree.find(&s.a).unwrap().total_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_into_own_subtree_leaves_tree_unchanged() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());
        admin.assign_item(&t, &u, "post-1", "Post", Some(&s.b)).await?;

        let before = admin.tree(&t).await?;
        let items_before = admin.items(&t, Some(&s.b)).await?;

        for target in [&s.b, &s.d] {
            let err = admin.delete(&t, &u, &s.b, Some(target), false).await.unwrap_err();
            assert!(matches!(err, CategoryTreeError::InvalidTarget { .. }));
        }

        let after = admin.tree(&t).await?;
        assert_eq!(before.categories(), after.categories());
        assert_eq!(items_before, admin.items(&t, Some(&s.b)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_siblings_swaps_children() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;

        admin
            .maintainer()
            .reorder_siblings(&tenant(), &user(), Some(&s.a), &[s.c.clone(), s.b.clone()])
            .await?;

        let tree = admin.tree(&tenant()).await?;
        let children: Vec<CategoryId> = tree
            .children_of(Some(&s.a))
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(children, vec![s.c.clone(), s.b.clone()]);
        assert_eq!(tree.find(&s.a).unwrap().width(), 10);
        assert_eq!(titles(&tree), vec!["A", "C", "E", "B", "D"]);
        assert!(tree.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_top_level() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());
        let f = admin.add(&t, &u, None, "F", "").await?;

        admin
            .maintainer()
            .reorder_siblings(&t, &u, None, &[f.clone(), s.a.clone()])
            .await?;

        let tree = admin.tree(&t).await?;
        assert_eq!(titles(&tree), vec!["F", "A", "B", "D", "C", "E"]);
        assert_eq!(tree.find(&f).unwrap().lft, 1);
        assert!(tree.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_and_promote_keeps_children() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());
        admin.assign_item(&t, &u, "post-1", "Post", Some(&s.b)).await?;

        // Content may go to a surviving child
        admin.delete(&t, &u, &s.b, Some(&s.d), true).await?;

        let tree = admin.tree(&t).await?;
        assert_eq!(titles(&tree), vec!["A", "D", "C", "E"]);
        let d = tree.find(&s.d).unwrap();
        assert_eq!((d.level, d.direct_count), (1, 1));
        assert_eq!(tree.parent_of(&s.d).map(|p| p.id.clone()), Some(s.a.clone()));
        assert_eq!(tree.find(&s.a).unwrap().total_count, 1);
        assert!(tree.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_then_rebuild_is_isomorphic() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        create_sample(&admin).await?;
        let (t, u) = (tenant(), user());

        let original = admin.tree(&t).await?;
        let original_relations = relations(&original);

        assert_eq!(admin.reset(&t, &u).await?, 5);
        let flat = admin.tree(&t).await?;
        assert!(flat.iter().all(|e| e.level == 0));
        assert!(relations(&flat).is_empty());
        assert!(flat.check_integrity().is_consistent());

        // Re-nest in the original preorder
        for category in original.categories() {
            let parent = original.parent_of(&category.id).map(|p| p.id.clone());
            admin
                .maintainer()
                .move_subtree(&t, &u, &category.id, parent.as_ref(), APPEND)
                .await?;
        }

        let rebuilt = admin.tree(&t).await?;
        assert_eq!(relations(&rebuilt), original_relations);
        assert_eq!(titles(&rebuilt), titles(&original));
        assert!(rebuilt.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_counts_conserved_across_structural_changes() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());

        let homes = [&s.a, &s.b, &s.c, &s.d, &s.e, &s.e];
        for (i, category) in homes.iter().enumerate() {
            admin
                .assign_item(&t, &u, &format!("post-{}", i), "Post", Some(category))
                .await?;
        }
        admin.assign_item(&t, &u, "draft", "Draft", None).await?;

        let top_level_total = |tree: &CategoryTree| -> i64 {
            tree.children_of(None).iter().map(|c| c.total_count).sum()
        };

        let maintainer = admin.maintainer();
        maintainer.move_subtree(&t, &u, &s.c, Some(&s.d), 0).await?;
        assert_eq!(top_level_total(&admin.tree(&t).await?), 6);

        maintainer.move_subtree(&t, &u, &s.e, None, 0).await?;
        assert_eq!(top_level_total(&admin.tree(&t).await?), 6);

        maintainer.reorder_siblings(&t, &u, None, &[s.a.clone(), s.e.clone()]).await?;
        admin.move_content(&t, &u, &s.e, Some(&s.b)).await?;
        let tree = admin.tree(&t).await?;
        assert_eq!(top_level_total(&tree), 6);
        assert_eq!(tree.total_content(), 6);
        assert_eq!(tree.find(&s.e).unwrap().total_count, 0);
        assert!(tree.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_recount_repairs_counts() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let (t, u) = (tenant(), user());
        admin.assign_item(&t, &u, "post-1", "Post", Some(&s.d)).await?;

        // Content written behind the tree's back
        let conn = admin.context().db.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO content_items (tenant_id, id, title, category_id) VALUES (?1, ?2, ?3, ?4)",
            (t.as_str(), "post-2", "Post", s.e.as_str()),
        )
        .await?;
        assert_eq!(admin.tree(&t).await?.find(&s.e).unwrap().direct_count, 0);

        assert_eq!(admin.recount(&t, &u).await?, 5);
        let tree = admin.tree(&t).await?;
        assert_eq!(tree.find(&s.e).unwrap().direct_count, 1);
        assert_eq!(tree.find(&s.a).unwrap().total_count, 2);
        assert!(tree.check_integrity().is_consistent());
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_plan_step_rolls_back_whole_plan() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let before = admin.tree(&tenant()).await?;

        let plan = OrderPlan {
            steps: vec![
                PlanStep::MoveSubtree {
                    category_id: s.d.clone(),
                    new_parent: None,
                },
                PlanStep::ReorderSiblings {
                    parent: Some(s.a.clone()),
                    children: vec![s.b.clone()],
                },
            ],
            skipped: 0,
        };
        let err = admin
            .maintainer()
            .apply_order(&tenant(), &user(), &plan)
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryTreeError::SetMismatch { .. }));

        let after = admin.tree(&tenant()).await?;
        assert_eq!(before.categories(), after.categories());
        Ok(())
    }

    #[tokio::test]
    async fn test_permission_denied_touches_nothing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db = CategoryDatabase::new(temp_dir.path().join("test.db")).await?;
        let ctx = TreeContext::new(db, TreeConfig::default())
            .with_permissions(Arc::new(StaticPermissions::new().grant("blog", "admin")));
        let admin = CategoryAdmin::new(ctx);
        let mut events = admin.subscribe();

        let t = tenant();
        let a = admin.add(&t, &user(), None, "A", "").await?;

        let guest = UserId::from("guest");
        let err = admin.add(&t, &guest, Some(&a), "B", "").await.unwrap_err();
        assert!(matches!(err, CategoryTreeError::PermissionDenied { .. }));
        let err = admin.reset(&t, &guest).await.unwrap_err();
        assert!(matches!(err, CategoryTreeError::PermissionDenied { .. }));

        // Granted in one tenant only
        let err = admin
            .add(&TenantId::from("shop"), &user(), None, "A", "")
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryTreeError::PermissionDenied { .. }));

        assert_eq!(admin.tree(&t).await?.len(), 1);

        assert!(events.recv().await?.succeeded());
        let denied = events.recv().await?;
        assert!(!denied.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let s = create_sample(&admin).await?;
        let shop = TenantId::from("shop");

        admin.add(&shop, &user(), None, "A", "a").await?;
        admin.delete(&tenant(), &user(), &s.a, None, false).await?;

        assert!(admin.tree(&tenant()).await?.is_empty());
        let shop_tree = admin.tree(&shop).await?;
        assert_eq!(shop_tree.len(), 1);
        assert_eq!(shop_tree.categories()[0].lft, 1);

        let err = admin
            .rename(&shop, &user(), &s.b, "B", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, CategoryTreeError::NotFound { .. }));
        Ok(())
    }

    /// Structural operations on one tenant, all started at once
    fn spawn_mutations(
        admin: &CategoryAdmin,
        t: &TenantId,
        s: &Sample,
    ) -> Vec<JoinHandle<Result<(), CategoryTreeError>>> {
        let retry = ConflictRetry::from_config(&TreeConfig::default());
        let mut handles = Vec::new();

        for i in 0..6 {
            let (admin, t, u) = (admin.clone(), t.clone(), user());
            let parent = [&s.a, &s.b, &s.c][i % 3].clone();
            let title = format!("Extra {}", i);
            handles.push(tokio::spawn(async move {
                retry
                    .run(|| admin.add(&t, &u, Some(&parent), &title, ""))
                    .await
                    .map(|_| ())
            }));
        }

        let moves = [
            (s.b.clone(), Some(s.c.clone()), APPEND),
            (s.e.clone(), None, 0),
            (s.c.clone(), Some(s.b.clone()), 0),
        ];
        for (node, parent, position) in moves {
            let (admin, t, u) = (admin.clone(), t.clone(), user());
            handles.push(tokio::spawn(async move {
                retry
                    .run(|| {
                        admin
                            .maintainer()
                            .move_subtree(&t, &u, &node, parent.as_ref(), position)
                    })
                    .await
            }));
        }

        {
            let (admin, t, u) = (admin.clone(), t.clone(), user());
            let (a, children) = (s.a.clone(), vec![s.c.clone(), s.b.clone()]);
            handles.push(tokio::spawn(async move {
                retry
                    .run(|| admin.maintainer().reorder_siblings(&t, &u, Some(&a), &children))
                    .await
            }));
        }

        {
            let (admin, t, u) = (admin.clone(), t.clone(), user());
            let (d, a) = (s.d.clone(), s.a.clone());
            handles.push(tokio::spawn(async move {
                retry
                    .run(|| admin.delete(&t, &u, &d, Some(&a), false))
                    .await
                    .map(|_| ())
            }));
        }

        handles
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_keep_tree_consistent() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let (blog, news) = (tenant(), TenantId::from("news"));

        let mut handles = Vec::new();
        for t in [&blog, &news] {
            let s = create_sample_in(&admin, t).await?;
            for (k, category) in [&s.b, &s.c, &s.d, &s.e].into_iter().enumerate() {
                for n in 0..2 {
                    let item = format!("post-{}-{}", k, n);
                    admin.assign_item(t, &user(), &item, "Post", Some(category)).await?;
                }
            }
            handles.extend(spawn_mutations(&admin, t, &s));
        }

        for handle in handles {
            if let Err(e) = handle.await? {
                // Losing a race against another mutation is fine; corrupting the tree is not
                assert!(
                    matches!(
                        e,
                        CategoryTreeError::NotFound { .. }
                            | CategoryTreeError::SetMismatch { .. }
                            | CategoryTreeError::CycleRejected { .. }
                            | CategoryTreeError::InvalidTarget { .. }
                    ),
                    "unexpected failure: {}",
                    e
                );
            }
        }

        for t in [&blog, &news] {
            let tree = admin.tree(t).await?;
            let report = tree.check_integrity();
            assert!(report.is_consistent(), "{}: {:?}", t, report.violations);

            // 5 sample categories + 6 added - D
            assert_eq!(tree.len(), 10);
            assert!(tree.iter().all(|e| e.category.tenant_id == *t));

            let conn = admin.context().db.connect_with_timeout().await?;
            let categorized = admin.context().content.count_categorized(&conn, t).await?;
            let top_level: i64 = tree.children_of(None).iter().map(|c| c.total_count).sum();
            assert_eq!(categorized, 8);
            assert_eq!(top_level, categorized);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_mutations_wait_for_their_tenant_only() -> Result<()> {
        let (admin, _temp_dir) = create_admin().await?;
        let (blog, news) = (tenant(), TenantId::from("news"));

        let guard = admin.context().locks.acquire(&blog).await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            admin.add(&blog, &user(), None, "A", ""),
        )
        .await;
        assert!(blocked.is_err(), "a write on a locked tenant must wait");

        tokio::time::timeout(
            Duration::from_secs(5),
            admin.add(&news, &user(), None, "A", ""),
        )
        .await??;

        drop(guard);
        admin.add(&blog, &user(), None, "A", "").await?;

        assert_eq!(admin.tree(&blog).await?.len(), 1);
        assert_eq!(admin.tree(&news).await?.len(), 1);
        Ok(())
    }
}
