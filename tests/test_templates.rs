mod common;

use common::*;
use coinsum::detection::templates::{prepare_templates, TemplatePrep, TemplateSet, COMMON_SIZE};

#[test]
fn prepares_edge_templates_for_image_files() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let output = tempfile::TempDir::new()?;
    let out_dir = output.path().join("edges");

    save_png(&coin_photo(120, 120, &[(60, 60, 45)]), input.path(), "Dime_front.png");
    save_png(&coin_photo(120, 120, &[(60, 60, 50)]), input.path(), "Quarter_back.png");
    std::fs::write(input.path().join("notes.txt"), "not an image")?;

    let written = prepare_templates(input.path(), &out_dir, &TemplatePrep::default())?;

    assert_eq!(written.len(), 2);
    assert!(out_dir.join("edge_Dime_front.png").is_file());
    assert!(out_dir.join("edge_Quarter_back.png").is_file());

    let edges = image::open(out_dir.join("edge_Dime_front.png"))?.to_luma8();
    assert_eq!(edges.dimensions(), (120, 120));
    assert!(edges.pixels().any(|p| p[0] > 0), "template should contain edges");
    assert!(edges.pixels().all(|p| p[0] == 0 || p[0] == 255));
    Ok(())
}

#[test]
fn loads_templates_grouped_by_filename() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let photo = coin_photo(80, 80, &[(40, 40, 30)]);
    save_png(&photo, dir.path(), "edge_Dime_1.png");
    save_png(&photo, dir.path(), "edge_Dime_2.png");
    save_png(&photo, dir.path(), "edge_penny.png");
    save_png(&photo, dir.path(), "edge_mystery.png");

    let set = TemplateSet::load(dir.path())?;

    assert_eq!(set.len(), 3);
    assert_eq!(set.size(), COMMON_SIZE);
    Ok(())
}

#[test]
fn missing_template_folder_is_an_error() {
    let err = TemplateSet::load(std::path::Path::new("/nonexistent/templates"))
        .expect_err("folder does not exist");
    assert!(matches!(err.downcast_ref::<CoinError>(), Some(CoinError::TemplateDir { .. })));
}
