use super::{
    find_unresolved, is_in_fixture_reference, patch_manifest, substitute_packages,
    PackageManifest,
};
use crate::error::RunnerError;
use crate::runfiles::RunfilesResolver;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

fn manifest(text: &str) -> PackageManifest {
    PackageManifest::parse(PathBuf::from("/fixture/package.json"), text).expect("parse manifest")
}

fn packages(entries: &[(&str, &str)]) -> BTreeMap<String, PathBuf> {
    entries
        .iter()
        .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
        .collect()
}

fn names(entries: &[&str]) -> BTreeSet<String> {
    entries.iter().map(|name| name.to_string()).collect()
}

fn dependency<'a>(manifest: &'a PackageManifest, name: &str) -> Option<&'a str> {
    manifest.dependency(name).and_then(Value::as_str)
}

#[test]
fn substitution_rewrites_both_dependency_sections() {
    let mut manifest = manifest(
        r#"{
          "name": "fixture",
          "dependencies": {"my-lib": "^1.0.0", "left-pad": "1.3.0"},
          "devDependencies": {"my-tool": "~2.0.0"}
        }"#,
    );
    let applied = substitute_packages(
        &mut manifest,
        &packages(&[
            ("my-lib", "/artifacts/my-lib.tgz-dir"),
            ("my-tool", "/artifacts/my-tool"),
            ("not-listed", "/artifacts/not-listed"),
        ]),
    );

    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0].name, "my-lib");
    assert_eq!(applied[0].section, "dependencies");
    assert_eq!(applied[0].previous, "^1.0.0");
    assert_eq!(applied[1].section, "devDependencies");
    assert_eq!(
        dependency(&manifest, "my-lib"),
        Some("file:/artifacts/my-lib.tgz-dir")
    );
    assert_eq!(
        dependency(&manifest, "my-tool"),
        Some("file:/artifacts/my-tool")
    );
    assert_eq!(dependency(&manifest, "left-pad"), Some("1.3.0"));
    assert_eq!(dependency(&manifest, "not-listed"), None);
}

#[test]
fn substitution_is_idempotent() {
    let mut manifest = manifest(r#"{"dependencies": {"my-lib": "^1.0.0"}}"#);
    let mapping = packages(&[("my-lib", "/artifacts/my-lib")]);

    substitute_packages(&mut manifest, &mapping);
    let first = manifest.to_json_string().expect("serialize");
    substitute_packages(&mut manifest, &mapping);
    let second = manifest.to_json_string().expect("serialize");

    assert_eq!(first, second);
    assert_eq!(dependency(&manifest, "my-lib"), Some("file:/artifacts/my-lib"));
}

#[test]
fn serialization_preserves_key_order() {
    let manifest = manifest(r#"{"name": "z", "version": "1.0.0", "dependencies": {"b": "1", "a": "2"}}"#);
    let text = manifest.to_json_string().expect("serialize");
    let name = text.find("\"name\"").expect("name key");
    let version = text.find("\"version\"").expect("version key");
    let b = text.find("\"b\"").expect("b key");
    let a = text.find("\"a\"").expect("a key");
    assert!(name < version);
    assert!(b < a);
    assert!(text.ends_with("}\n"));
}

#[test]
fn checked_packages_must_reference_local_files() {
    let manifest = manifest(
        r#"{
          "dependencies": {
            "ok-lib": "file:/artifacts/ok-lib",
            "registry-lib": "^2.0.0",
            "relative-lib": "file:../outside"
          },
          "devDependencies": {"other-lib": "file:./vendor/other-lib"}
        }"#,
    );
    let unresolved = find_unresolved(
        &manifest,
        &names(&["ok-lib", "registry-lib", "relative-lib", "other-lib", "absent-lib"]),
        &BTreeSet::new(),
    );
    assert_eq!(unresolved, vec!["other-lib", "registry-lib", "relative-lib"]);
}

#[test]
fn checked_bare_in_fixture_reference_is_unresolved() {
    let manifest = manifest(r#"{"dependencies": {"other-lib": "file:vendor/other-lib"}}"#);
    let checked = find_unresolved(&manifest, &names(&["other-lib"]), &BTreeSet::new());
    let unchecked = find_unresolved(&manifest, &BTreeSet::new(), &BTreeSet::new());
    assert_eq!(checked, vec!["other-lib"]);
    assert_eq!(checked, unchecked);
}

#[test]
fn unchecked_in_fixture_references_are_reported() {
    let manifest = manifest(
        r#"{
          "dependencies": {
            "vendored": "file:./vendor/thing",
            "sibling": "file:../sibling",
            "registry": "^1.0.0",
            "absolute": "file:/artifacts/absolute"
          },
          "devDependencies": {"bare": "file:lib/bare"}
        }"#,
    );
    let unresolved = find_unresolved(&manifest, &BTreeSet::new(), &BTreeSet::new());
    assert_eq!(unresolved, vec!["vendored", "bare"]);
}

#[test]
fn substituted_entries_are_not_rescanned() {
    let mut manifest = manifest(r#"{"dependencies": {"my-lib": "file:./local"}}"#);
    let applied = substitute_packages(&mut manifest, &packages(&[("my-lib", "relative/dist")]));
    let substituted: BTreeSet<String> = applied.into_iter().map(|sub| sub.name).collect();
    assert!(find_unresolved(&manifest, &BTreeSet::new(), &substituted).is_empty());
}

#[test]
fn in_fixture_reference_detection() {
    assert!(is_in_fixture_reference("file:."));
    assert!(is_in_fixture_reference("file:./vendor/lib"));
    assert!(is_in_fixture_reference("file:vendor/../lib"));
    assert!(!is_in_fixture_reference("file:../lib"));
    assert!(!is_in_fixture_reference("file:./a/../../lib"));
    assert!(!is_in_fixture_reference("file:/abs/lib"));
    assert!(!is_in_fixture_reference("^1.0.0"));
}

#[test]
fn patch_manifest_rewrites_and_persists() {
    let dir = tempfile::tempdir().expect("create temp dir");
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "fixture", "dependencies": {"my-lib": "^1.0.0"}}"#,
    )
    .expect("write manifest");
    let resolver = RunfilesResolver::relative_to(Path::new("/artifacts/cwd"));
    let npm_packages: BTreeMap<String, String> =
        [("my-lib".to_string(), "my-lib.tgz-dir".to_string())].into();

    let applied = patch_manifest(dir.path(), &npm_packages, &names(&["my-lib"]), &resolver)
        .expect("patch manifest");
    assert_eq!(applied.len(), 1);

    let reloaded = PackageManifest::load(dir.path()).expect("reload");
    assert_eq!(reloaded.path(), dir.path().join("package.json"));
    assert_eq!(
        dependency(&reloaded, "my-lib"),
        Some("file:/artifacts/cwd/../my-lib.tgz-dir")
    );
}

#[test]
fn patch_manifest_reports_every_unresolved_package_and_leaves_file_untouched() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let original = r#"{"dependencies": {"my-lib": "^1.0.0", "other-lib": "file:./vendor/other-lib", "third": "^3.0.0"}}"#;
    fs::write(dir.path().join("package.json"), original).expect("write manifest");
    let resolver = RunfilesResolver::relative_to(Path::new("/artifacts/cwd"));
    let npm_packages: BTreeMap<String, String> =
        [("my-lib".to_string(), "my-lib".to_string())].into();

    let err = patch_manifest(
        dir.path(),
        &npm_packages,
        &names(&["my-lib", "other-lib", "third"]),
        &resolver,
    )
    .expect_err("unresolved packages");
    match err.downcast_ref::<RunnerError>() {
        Some(RunnerError::UnresolvedPackageSubstitution { names }) => {
            assert_eq!(names, &vec!["other-lib".to_string(), "third".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(dir.path().join("package.json")).expect("read manifest"),
        original
    );
}

#[test]
fn missing_manifest_is_reported() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let resolver = RunfilesResolver::relative_to(dir.path());
    let err = patch_manifest(dir.path(), &BTreeMap::new(), &BTreeSet::new(), &resolver)
        .expect_err("missing manifest");
    assert!(matches!(
        err.downcast_ref::<RunnerError>(),
        Some(RunnerError::MissingManifest { .. })
    ));
}
