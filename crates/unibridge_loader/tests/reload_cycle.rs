use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

use unibridge_core::GLUE_ABI_VERSION;
use unibridge_core::entry::{ABI_VERSION_SYMBOL, AbiVersionFn, INVOKE_SYMBOL, ModuleInvokeFn};
use unibridge_loader::{LoaderConfig, LoaderError, ModuleImage};

/// Builds the demo module with the same profile as this test and returns
/// the path of the resulting library.
fn demo_module() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    // target/<profile>/deps/<test binary>
    let profile_dir = exe.parent().unwrap().parent().unwrap().to_path_buf();
    let release = profile_dir.file_name().is_some_and(|name| name == "release");

    let mut args = vec!["build", "-p", "unibridge_demo", "--lib"];
    if release {
        args.push("--release");
    }
    duct::cmd(env!("CARGO"), args)
        .dir(env!("CARGO_MANIFEST_DIR"))
        .run()
        .expect("failed to build the demo module");

    profile_dir.join(format!("{DLL_PREFIX}unibridge_demo{DLL_SUFFIX}"))
}

fn abi_version(image: &ModuleImage) -> u32 {
    let version: AbiVersionFn = unsafe { image.find_symbol(ABI_VERSION_SYMBOL).unwrap() };
    version()
}

fn scratch_config(dir: &Path) -> LoaderConfig {
    LoaderConfig {
        scratch_dir: Some(dir.to_path_buf()),
        ..LoaderConfig::default()
    }
}

#[test]
fn test_load_unload_load() {
    let module = demo_module();
    let scratch = tempfile::tempdir().unwrap();
    let config = scratch_config(scratch.path());

    let mut first = ModuleImage::load(&module, &config).unwrap();
    let first_copy = first.image_path().unwrap().to_path_buf();
    assert_ne!(first_copy, module);
    assert!(first_copy.starts_with(scratch.path()));
    assert_eq!(abi_version(&first), GLUE_ABI_VERSION);
    let _invoke: ModuleInvokeFn = unsafe { first.find_symbol(INVOKE_SYMBOL).unwrap() };

    first.unload().unwrap();
    assert!(!first.is_loaded());
    assert!(!first_copy.exists());
    // a second unload is a no-op
    first.unload().unwrap();

    let second = ModuleImage::load(&module, &config).unwrap();
    let second_copy = second.image_path().unwrap().to_path_buf();
    assert_ne!(first_copy, second_copy);
    assert_eq!(abi_version(&second), GLUE_ABI_VERSION);

    drop(second);
    assert!(!second_copy.exists());
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_each_load_maps_its_own_image() {
    let module = demo_module();
    let scratch = tempfile::tempdir().unwrap();
    let config = scratch_config(scratch.path());

    let first = ModuleImage::load(&module, &config).unwrap();
    let second = ModuleImage::load(&module, &config).unwrap();
    let first_fn: AbiVersionFn = unsafe { first.find_symbol(ABI_VERSION_SYMBOL).unwrap() };
    let second_fn: AbiVersionFn = unsafe { second.find_symbol(ABI_VERSION_SYMBOL).unwrap() };

    // a cached image would hand back the same address twice
    assert_ne!(first_fn as usize, second_fn as usize);
    assert_eq!(first_fn(), second_fn());
}

#[test]
fn test_loaded_image_survives_source_rewrite() {
    let source_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let config = scratch_config(scratch.path());
    let module = source_dir
        .path()
        .join(format!("{DLL_PREFIX}rewritten{DLL_SUFFIX}"));
    std::fs::copy(demo_module(), &module).unwrap();

    let image = ModuleImage::load(&module, &config).unwrap();
    std::fs::write(&module, b"half a build").unwrap();

    // the mapped copy is untouched by the rebuild
    assert_eq!(abi_version(&image), GLUE_ABI_VERSION);
    assert!(ModuleImage::load(&module, &config).is_err());
    assert_eq!(abi_version(&image), GLUE_ABI_VERSION);
}

#[test]
fn test_missing_symbol_is_fatal() {
    let module = demo_module();
    let scratch = tempfile::tempdir().unwrap();
    let image = ModuleImage::load(&module, &scratch_config(scratch.path())).unwrap();

    let result: Result<AbiVersionFn, _> = unsafe { image.find_symbol("no_such_entry_point") };
    assert!(matches!(result, Err(LoaderError::Symbol { .. })));
}

#[test]
fn test_symbols_unavailable_after_unload() {
    let module = demo_module();
    let scratch = tempfile::tempdir().unwrap();
    let mut image = ModuleImage::load(&module, &scratch_config(scratch.path())).unwrap();
    image.unload().unwrap();

    let result: Result<AbiVersionFn, _> = unsafe { image.find_symbol(ABI_VERSION_SYMBOL) };
    assert!(matches!(result, Err(LoaderError::NotLoaded)));
}
