use oxattach::{DepthPolicy, Settings, TypeTaxonomy, Vault};

fn mkdirs(root: &std::path::Path, dirs: &[&str]) {
    for d in dirs {
        std::fs::create_dir_all(root.join(d)).unwrap();
    }
}

fn settings(roots: &[&str], excluded: &[&str], depth: DepthPolicy) -> Settings {
    Settings {
        type_folders: roots.iter().map(|s| s.to_string()).collect(),
        excluded_folders: excluded.iter().map(|s| s.to_string()).collect(),
        type_depth: depth,
        ..Settings::default()
    }
}

fn paths(tax: &mut TypeTaxonomy, vault: &Vault) -> Vec<String> {
    tax.all_types(vault).iter().map(|t| t.path.clone()).collect()
}

#[test]
fn types_follow_the_folder_tree_on_disk() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    mkdirs(temp.path(), &["Root/X", "Root/Y/Z", "Root/.hidden/inner"]);
    std::fs::write(temp.path().join("Root/Y/note.md"), "")?;
    let vault = Vault::open(temp.path())?;

    let mut leaf = TypeTaxonomy::new(&settings(&["Root"], &[], DepthPolicy::Leaf));
    assert_eq!(paths(&mut leaf, &vault), vec!["Root/X", "Root/Y/Z"]);

    let mut all = TypeTaxonomy::new(&settings(&["Root"], &[], DepthPolicy::All));
    assert_eq!(paths(&mut all, &vault), vec!["Root", "Root/X", "Root/Y", "Root/Y/Z"]);

    let mut excluded = TypeTaxonomy::new(&settings(&["Root"], &["Root/Y"], DepthPolicy::All));
    assert_eq!(paths(&mut excluded, &vault), vec!["Root", "Root/X"]);
    Ok(())
}

#[test]
fn new_folders_show_up_only_after_invalidate() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    mkdirs(temp.path(), &["01 Action Items/Tasks", "02 Pages/Projects"]);
    let vault = Vault::open(temp.path())?;
    let mut tax = TypeTaxonomy::new(&Settings::default());

    assert_eq!(
        paths(&mut tax, &vault),
        vec!["01 Action Items/Tasks", "02 Pages/Projects"]
    );

    mkdirs(temp.path(), &["01 Action Items/Events"]);
    assert_eq!(
        paths(&mut tax, &vault),
        vec!["01 Action Items/Tasks", "02 Pages/Projects"]
    );

    tax.invalidate();
    assert_eq!(
        paths(&mut tax, &vault),
        vec![
            "01 Action Items/Events",
            "01 Action Items/Tasks",
            "02 Pages/Projects"
        ]
    );

    let events = tax.type_by_name(&vault, "EVENTS").expect("events type");
    assert_eq!(events.icon().as_str(), "calendar");
    assert!(tax.type_for_path(&vault, "01 Action Items").is_none());
    Ok(())
}

#[test]
fn missing_roots_degrade_to_empty() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault = Vault::open(temp.path())?;
    let mut tax = TypeTaxonomy::new(&settings(&["Nope", ""], &[], DepthPolicy::All));
    assert!(tax.all_types(&vault).is_empty());
    assert!(tax.is_valid());
    Ok(())
}

#[test]
fn reconfigure_forces_a_rebuild() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    mkdirs(temp.path(), &["Root/A/B"]);
    let vault = Vault::open(temp.path())?;
    let mut tax = TypeTaxonomy::new(&settings(&["Root"], &[], DepthPolicy::Leaf));
    assert_eq!(paths(&mut tax, &vault), vec!["Root/A/B"]);

    tax.configure(&settings(&["Root"], &[], DepthPolicy::All));
    assert!(!tax.is_valid());
    assert_eq!(paths(&mut tax, &vault), vec!["Root", "Root/A", "Root/A/B"]);
    Ok(())
}
