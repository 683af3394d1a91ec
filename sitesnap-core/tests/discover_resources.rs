mod common;

use std::fs;
use std::path::PathBuf;

use sitesnap_core::config::SnapshotOptions;
use sitesnap_core::error::SnapshotError;
use sitesnap_core::resource::{
    build_resources, sha256_hex, ResourceOrigin, ResourceRole, MAX_FILE_SIZE,
};
use sitesnap_core::scan::{scan_files, Classifier};
use sitesnap_core::synchronise::discover_resources;

use common::{minimal_site, multi_page_site, write, BASE_CSS};

fn urls(resources: &[sitesnap_core::resource::Resource]) -> Vec<String> {
    let mut urls: Vec<String> = resources.iter().map(|r| r.url.clone()).collect();
    urls.sort();
    urls
}

#[test]
fn test_minimal_site_yields_one_root_and_one_supporting_resource() {
    let site = minimal_site();
    let (roots, supporting) = discover_resources(site.path(), &SnapshotOptions::default())
        .expect("discovery should succeed");

    assert_eq!(urls(&roots), vec!["/index.html"]);
    assert_eq!(urls(&supporting), vec!["/css/base.css"]);
    assert_eq!(roots[0].role, ResourceRole::Root);
    assert_eq!(supporting[0].role, ResourceRole::Supporting);
    assert_eq!(supporting[0].digest, sha256_hex(BASE_CSS.as_bytes()));
}

#[test]
fn test_scanner_skips_version_control_metadata() {
    let site = multi_page_site();
    let files = scan_files(site.path()).unwrap();
    assert!(
        files
            .iter()
            .all(|p| !p.components().any(|c| c.as_os_str() == ".git")),
        "no .git path should be scanned: {files:?}"
    );
    assert_eq!(files.len(), 7);
}

#[test]
fn test_multi_page_site_classification() {
    let site = multi_page_site();
    let (roots, supporting) =
        discover_resources(site.path(), &SnapshotOptions::default()).unwrap();

    assert_eq!(
        urls(&roots),
        vec!["/about.html", "/blog/post.htm", "/index.html"]
    );
    assert_eq!(
        urls(&supporting),
        vec!["/css/base.css", "/images/logo-copy.png", "/images/logo.png"]
    );
}

#[test]
fn test_identical_bytes_share_a_digest_regardless_of_path() {
    let site = multi_page_site();
    let (_, supporting) = discover_resources(site.path(), &SnapshotOptions::default()).unwrap();
    let logo = supporting.iter().find(|r| r.url == "/images/logo.png").unwrap();
    let copy = supporting
        .iter()
        .find(|r| r.url == "/images/logo-copy.png")
        .unwrap();
    assert_eq!(logo.digest, copy.digest);
    assert_ne!(logo.origin, copy.origin);
}

#[test]
fn test_include_all_takes_every_non_root_file() {
    let site = multi_page_site();
    let options = SnapshotOptions {
        include_all: true,
        ..SnapshotOptions::default()
    };
    let (roots, supporting) = discover_resources(site.path(), &options).unwrap();
    assert_eq!(roots.len(), 3);
    assert!(supporting.iter().any(|r| r.url == "/notes.txt"));
    assert!(supporting.iter().all(|r| !r.url.ends_with(".html")));
}

#[test]
fn test_url_with_spaces_is_percent_encoded() {
    let site = minimal_site();
    write(site.path(), "css/test with spaces.css", "a{}");
    let path = site.path().join("css/test with spaces.css");

    let resources =
        build_resources(&[path], site.path(), "/", ResourceRole::Supporting).unwrap();
    assert_eq!(resources[0].url, "/css/test%20with%20spaces.css");
}

#[test]
fn test_custom_baseurl_with_spaces_for_root_resource() {
    let site = minimal_site();
    let path = site.path().join("index.html");

    let resources =
        build_resources(&[path.clone()], site.path(), "/test baseurl/", ResourceRole::Root)
            .unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].url, "/test%20baseurl/index.html");
    assert_eq!(resources[0].role, ResourceRole::Root);
    assert_eq!(resources[0].origin, ResourceOrigin::Local(path));
}

#[test]
fn test_strip_prefix_with_trailing_separator() {
    let site = minimal_site();
    let mut prefix = site.path().as_os_str().to_owned();
    prefix.push("/");
    let path = site.path().join("css/base.css");

    let resources = build_resources(
        &[path],
        &PathBuf::from(prefix),
        "/docs/",
        ResourceRole::Supporting,
    )
    .unwrap();
    assert_eq!(resources[0].url, "/docs/css/base.css");
}

#[test]
fn test_derived_urls_start_with_base_and_have_no_raw_whitespace() {
    let site = minimal_site();
    write(site.path(), "a b/c\td.css", "x");
    write(site.path(), "ünï.css", "y");
    let files = scan_files(site.path()).unwrap();

    for base in ["/", "/docs/", "/my site"] {
        let resources =
            build_resources(&files, site.path(), base, ResourceRole::Supporting).unwrap();
        let encoded_base = base.replace(' ', "%20");
        for r in &resources {
            assert!(r.url.starts_with(encoded_base.trim_end_matches('/')), "{}", r.url);
            assert!(!r.url.contains(char::is_whitespace), "{}", r.url);
            assert!(!r.url.contains("//"), "{}", r.url);
        }
    }
}

#[test]
fn test_relative_baseurl_is_an_argument_error() {
    let site = minimal_site();
    let options = SnapshotOptions {
        baseurl: "docs/".into(),
        ..SnapshotOptions::default()
    };
    let err = discover_resources(site.path(), &options).unwrap_err();
    assert!(matches!(err, SnapshotError::InvalidBaseUrl(_)), "{err:?}");
}

#[test]
fn test_oversized_files_are_skipped_silently() {
    let site = minimal_site();
    let big = site.path().join("images/huge.png");
    fs::create_dir_all(big.parent().unwrap()).unwrap();
    let file = fs::File::create(&big).unwrap();
    file.set_len(MAX_FILE_SIZE + 1).unwrap();

    let (_, supporting) = discover_resources(site.path(), &SnapshotOptions::default()).unwrap();
    assert_eq!(urls(&supporting), vec!["/css/base.css"]);
}

#[test]
fn test_roles_follow_the_builder_argument() {
    let site = multi_page_site();
    let classifier = Classifier::new(site.path(), None, false).unwrap();
    let (root_paths, supporting_paths) = classifier.classify(&scan_files(site.path()).unwrap());

    let roots = build_resources(&root_paths, site.path(), "/", ResourceRole::Root).unwrap();
    let supporting =
        build_resources(&supporting_paths, site.path(), "/", ResourceRole::Supporting).unwrap();
    assert!(roots.iter().all(|r| r.is_root()));
    assert!(supporting.iter().all(|r| !r.is_root()));
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_followed_and_cycles_terminate() {
    use std::os::unix::fs::symlink;

    let site = minimal_site();
    let shared = tempfile::TempDir::new().unwrap();
    write(shared.path(), "shared.css", "shared{}");
    symlink(shared.path(), site.path().join("linked")).unwrap();
    symlink(site.path(), site.path().join("css/loop")).unwrap();

    let (_, supporting) = discover_resources(site.path(), &SnapshotOptions::default()).unwrap();
    assert_eq!(
        urls(&supporting),
        vec!["/css/base.css", "/linked/shared.css"]
    );
}
