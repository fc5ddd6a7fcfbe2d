use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use oxattach::{
    CreateOptions, Error, FolderTemplate, FolderTemplates, Relationships, TemplateHook,
    TemplateTarget, TypeRecord, Vault, VaultConfig, VaultIndex, VaultPath, create_attached_note,
};

fn write(root: &Path, rel: &str, content: &str) {
    let abs = root.join(rel);
    std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
    std::fs::write(abs, content).unwrap();
}

fn p(s: &str) -> VaultPath {
    VaultPath::try_from(s).unwrap()
}

fn fixture(template_wait: Duration) -> anyhow::Result<(tempfile::TempDir, Vault)> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "Projects/Alpha.md", "# Alpha\n");
    std::fs::create_dir_all(temp.path().join("01 Action Items/Tasks"))?;
    let cfg = VaultConfig {
        template_wait,
        ..VaultConfig::default()
    };
    let vault = Vault::with_config(temp.path(), cfg)?;
    Ok((temp, vault))
}

fn tasks() -> TypeRecord {
    TypeRecord::from_folder("01 Action Items/Tasks")
}

fn frontmatter_of(vault: &Vault, path: &VaultPath) -> oxattach::Frontmatter {
    let idx = VaultIndex::build(vault).unwrap();
    idx.frontmatter(path).cloned().unwrap_or_default()
}

#[tokio::test]
async fn created_note_links_back_to_parent() -> anyhow::Result<()> {
    let (_temp, vault) = fixture(Duration::from_millis(100))?;
    let parent = p("Projects/Alpha.md");
    let opts = CreateOptions {
        body: "Call the venue.".into(),
        ..CreateOptions::default()
    };

    let path = create_attached_note(&vault, "attachments", None, &parent, &tasks(), "New Task", &opts)
        .await?;
    assert_eq!(path, p("01 Action Items/Tasks/New Task.md"));

    let fm = frontmatter_of(&vault, &path);
    assert_eq!(fm.title(), Some("New Task"));
    assert_eq!(fm.get_str("attachments"), Some("[[Alpha]]"));
    assert_eq!(fm.status(), Some("open"));
    assert_eq!(fm.priority(), Some("normal"));
    assert!(vault.read(&path)?.ends_with("\nCall the venue."));

    let idx = VaultIndex::build(&vault)?;
    let rel = Relationships::new(&idx, "attachments");
    assert_eq!(rel.all_parent_notes(&path), vec![parent.clone()]);
    assert_eq!(rel.attached_notes(&parent, &[tasks()])[0].path, path);
    Ok(())
}

#[tokio::test]
async fn duplicate_name_fails_without_side_effects() -> anyhow::Result<()> {
    let (temp, vault) = fixture(Duration::from_millis(100))?;
    write(temp.path(), "01 Action Items/Tasks/New Task.md", "original\n");

    let opts = CreateOptions {
        status: "blocked".into(),
        ..CreateOptions::default()
    };
    let err = create_attached_note(
        &vault,
        "attachments",
        None,
        &p("Projects/Alpha.md"),
        &tasks(),
        "New Task",
        &opts,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::DuplicateName(ref path) if *path == p("01 Action Items/Tasks/New Task.md")));
    assert_eq!(vault.read(&p("01 Action Items/Tasks/New Task.md"))?, "original\n");
    Ok(())
}

#[tokio::test]
async fn folder_template_values_survive() -> anyhow::Result<()> {
    let (temp, vault) = fixture(Duration::from_secs(5))?;
    write(
        temp.path(),
        "Templates/Task.md",
        "---\nstatus: blocked\ntags: [task]\n---\n# {{title}}\n",
    );
    let hook: Arc<dyn TemplateHook> = Arc::new(FolderTemplates::new(vec![FolderTemplate {
        folder: "01 Action Items/Tasks".into(),
        template: "Templates/Task".into(),
    }]));

    let path = create_attached_note(
        &vault,
        "attachments",
        Some(hook),
        &p("Projects/Alpha.md"),
        &tasks(),
        "Plan offsite",
        &CreateOptions::default(),
    )
    .await?;

    let fm = frontmatter_of(&vault, &path);
    assert_eq!(fm.status(), Some("blocked"));
    assert_eq!(fm.priority(), Some("normal"));
    assert_eq!(fm.title(), Some("Plan offsite"));
    assert_eq!(fm.get_str("attachments"), Some("[[Alpha]]"));
    assert!(fm.contains_key("tags"));
    assert!(vault.read(&path)?.contains("# Plan offsite\n"));
    Ok(())
}

struct FailingHook;

impl TemplateHook for FailingHook {
    fn apply(&self, _target: &TemplateTarget) -> oxattach::Result<()> {
        Err(Error::Template("templater exploded".into()))
    }
}

/// Leaves front matter nobody can parse.
struct GarblingHook;

impl TemplateHook for GarblingHook {
    fn apply(&self, target: &TemplateTarget) -> oxattach::Result<()> {
        target.write("---\nstatus: [open\n---\n")?;
        Ok(())
    }
}

#[tokio::test]
async fn failing_template_falls_back_to_embedded_front_matter() -> anyhow::Result<()> {
    for hook in [
        Arc::new(FailingHook) as Arc<dyn TemplateHook>,
        Arc::new(GarblingHook) as Arc<dyn TemplateHook>,
    ] {
        let (_temp, vault) = fixture(Duration::from_secs(5))?;
        let opts = CreateOptions {
            body: "details".into(),
            status: "working".into(),
            priority: "high".into(),
        };
        let path = create_attached_note(
            &vault,
            "attachments",
            Some(hook),
            &p("Projects/Alpha.md"),
            &tasks(),
            "Fallback",
            &opts,
        )
        .await?;

        let content = vault.read(&path)?;
        assert!(content.starts_with("---\n"), "{content}");
        assert!(content.ends_with("---\n\ndetails"), "{content}");
        let fm = frontmatter_of(&vault, &path);
        assert_eq!(fm.status(), Some("working"));
        assert_eq!(fm.priority(), Some("high"));
        assert_eq!(fm.get_str("attachments"), Some("[[Alpha]]"));
    }
    Ok(())
}

struct SlowHook;

impl TemplateHook for SlowHook {
    fn apply(&self, _target: &TemplateTarget) -> oxattach::Result<()> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
    }
}

#[tokio::test]
async fn slow_template_does_not_block_creation() -> anyhow::Result<()> {
    let (_temp, vault) = fixture(Duration::from_millis(20))?;
    let started = std::time::Instant::now();
    let path = create_attached_note(
        &vault,
        "attachments",
        Some(Arc::new(SlowHook)),
        &p("Projects/Alpha.md"),
        &tasks(),
        "Quick",
        &CreateOptions::default(),
    )
    .await?;
    assert!(started.elapsed() < Duration::from_millis(450));

    let fm = frontmatter_of(&vault, &path);
    assert_eq!(fm.title(), Some("Quick"));
    assert_eq!(fm.status(), Some("open"));
    Ok(())
}

/// Sees the empty note in time but only writes after the wait is over.
struct LateHook;

impl TemplateHook for LateHook {
    fn apply(&self, target: &TemplateTarget) -> oxattach::Result<()> {
        let seen = target.read()?;
        std::thread::sleep(Duration::from_millis(300));
        if seen.is_empty() {
            target.write("---\nstatus: blocked\n---\n# tpl\n")?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn late_template_cannot_overwrite_the_parent_link() -> anyhow::Result<()> {
    let (_temp, vault) = fixture(Duration::from_millis(100))?;
    let parent = p("Projects/Alpha.md");
    let path = create_attached_note(
        &vault,
        "attachments",
        Some(Arc::new(LateHook)),
        &parent,
        &tasks(),
        "Late",
        &CreateOptions::default(),
    )
    .await?;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let content = vault.read(&path)?;
    assert!(!content.contains("# tpl"), "{content}");
    let fm = frontmatter_of(&vault, &path);
    assert_eq!(fm.get_str("attachments"), Some("[[Alpha]]"));
    assert_eq!(fm.status(), Some("open"));
    let idx = VaultIndex::build(&vault)?;
    assert_eq!(
        Relationships::new(&idx, "attachments").all_parent_notes(&path),
        vec![parent]
    );
    Ok(())
}

#[tokio::test]
async fn nested_type_folder_is_created_on_demand() -> anyhow::Result<()> {
    let (_temp, vault) = fixture(Duration::from_millis(100))?;
    let ty = TypeRecord::from_folder("02 Pages/Events");
    let path = create_attached_note(
        &vault,
        "parent",
        None,
        &p("Projects/Alpha.md"),
        &ty,
        "Launch 2024-05-01",
        &CreateOptions::default(),
    )
    .await?;
    assert_eq!(path, p("02 Pages/Events/Launch 2024-05-01.md"));
    assert_eq!(frontmatter_of(&vault, &path).get_str("parent"), Some("[[Alpha]]"));
    Ok(())
}
