#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use proguard_rewrite::pipeline::Error;
use proguard_rewrite::{
    Config, DescriptorError, DirectorySource, DocumentRewriter, MappingFile, MappingIndex,
    Pipeline,
};

static MAPPING: &[u8] = include_bytes!("res/mapping.txt");

const MOD_JSON: &str = r#"{"schemaVersion":1,"id":"tweaks","entrypoints":{"main":["net.example.tweaks.TweaksMod"],"client":["net.example.tweaks.TweaksClient::onInitializeClient"],"modmenu":[{"adapter":"default","value":"net.example.tweaks.compat.ModMenuCompat"}]},"mixins":["tweaks.mixins.json",{"config":"tweaks.client.mixins.json","environment":"client"}]}"#;

const MOD_JSON_REWRITTEN: &str = r#"{
  "schemaVersion": 1,
  "id": "tweaks",
  "entrypoints": {
    "main": [
      "a.a"
    ],
    "client": [
      "a.b::onInitializeClient"
    ],
    "modmenu": [
      {
        "adapter": "default",
        "value": "a.d"
      }
    ]
  },
  "mixins": [
    "tweaks.mixins.json",
    {
      "config": "tweaks.client.mixins.json",
      "environment": "client"
    }
  ]
}
"#;

const MIXINS_JSON: &str = r#"{"required":true,"package":"net.example.tweaks.mixin","refmap":"tweaks-refmap.json","mixins":["MinecraftClientMixin","LeavesBlockMixin"],"client":["client.GameRendererMixin"],"injectors":{"defaultRequire":1}}"#;

const MIXINS_JSON_REWRITTEN: &str = r#"{
  "required": true,
  "package": "a.e",
  "refmap": "tweaks-refmap.json",
  "mixins": [
    "a",
    "b"
  ],
  "client": [
    "c"
  ],
  "injectors": {
    "defaultRequire": 1
  }
}
"#;

const CLIENT_MIXINS_JSON: &str =
    r#"{"package":"net.example.tweaks.mixin.client","mixins":["GameRendererMixin"]}"#;

const CLIENT_MIXINS_JSON_REWRITTEN: &str = r#"{
  "package": "a.e",
  "mixins": [
    "c"
  ]
}
"#;

const REFMAP_JSON: &str = r#"{"mappings":{"net/example/tweaks/mixin/MinecraftClientMixin":{}}}"#;

fn build_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    fs::write(path, writer.finish().unwrap().into_inner()).unwrap();
}

fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|index| {
            let mut file = archive.by_index(index).unwrap();
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).unwrap();
            (file.name().to_owned(), contents)
        })
        .collect()
}

fn pipeline(dir: &Path, output: &str) -> Pipeline {
    let mappings = dir.join("mapping.txt");
    fs::write(&mappings, MAPPING).unwrap();
    Pipeline {
        input: dir.join("tweaks.jar"),
        mappings,
        overlay: dir.join("overlay"),
        output: dir.join(output),
        config: Config::default(),
    }
}

fn tweaks_jar(path: &Path) {
    build_jar(
        path,
        &[
            ("fabric.mod.json", MOD_JSON.as_bytes()),
            ("tweaks.mixins.json", MIXINS_JSON.as_bytes()),
            ("tweaks.client.mixins.json", CLIENT_MIXINS_JSON.as_bytes()),
            ("a/a.class", b"\xca\xfe\xba\xbe"),
            ("tweaks-refmap.json", REFMAP_JSON.as_bytes()),
        ],
    );
}

#[test]
fn test_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "tweaks-fixed.jar");
    tweaks_jar(&pipeline.input);

    let report = pipeline.run().unwrap();
    assert_eq!(
        report.documents,
        [
            "fabric.mod.json",
            "tweaks.mixins.json",
            "tweaks.client.mixins.json"
        ]
    );
    assert_eq!(report.refmaps, ["tweaks-refmap.json"]);

    let expected: Vec<(String, Vec<u8>)> = [
        ("fabric.mod.json", MOD_JSON_REWRITTEN.as_bytes()),
        ("tweaks.mixins.json", MIXINS_JSON_REWRITTEN.as_bytes()),
        (
            "tweaks.client.mixins.json",
            CLIENT_MIXINS_JSON_REWRITTEN.as_bytes(),
        ),
        ("a/a.class", b"\xca\xfe\xba\xbe"),
        ("tweaks-refmap.json", REFMAP_JSON.as_bytes()),
    ]
    .iter()
    .map(|(name, contents)| (name.to_string(), contents.to_vec()))
    .collect();
    assert_eq!(read_jar(&pipeline.output), expected);

    // the input is left alone
    assert_eq!(
        read_jar(&pipeline.input)[0].1,
        MOD_JSON.as_bytes().to_vec()
    );
}

#[test]
fn test_run_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "tweaks.jar");
    tweaks_jar(&pipeline.input);

    pipeline.run().unwrap();
    let first = read_jar(&pipeline.output);
    assert_eq!(first[0].1, MOD_JSON_REWRITTEN.as_bytes());

    // names are already obfuscated, so nothing changes anymore
    pipeline.run().unwrap();
    assert_eq!(read_jar(&pipeline.output), first);
}

#[test]
fn test_clean_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline(dir.path(), "out.jar");
    tweaks_jar(&pipeline.input);

    fs::create_dir_all(&pipeline.overlay).unwrap();
    fs::write(pipeline.overlay.join("stale.json"), "{}").unwrap();

    pipeline.config.clean_overlay = false;
    pipeline.run().unwrap();
    assert!(read_jar(&pipeline.output)
        .iter()
        .any(|(name, _)| name == "stale.json"));

    pipeline.config.clean_overlay = true;
    pipeline.run().unwrap();
    assert!(!pipeline.overlay.join("stale.json").exists());
    assert!(read_jar(&pipeline.output)
        .iter()
        .all(|(name, _)| name != "stale.json"));
}

#[test]
fn test_rewrite_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("resources");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("quilt.mod.json"), MOD_JSON).unwrap();
    fs::write(source.join("tweaks.mixins.json"), MIXINS_JSON).unwrap();
    fs::write(source.join("tweaks.client.mixins.json"), CLIENT_MIXINS_JSON).unwrap();

    let mut pipeline = pipeline(dir.path(), "out.jar");
    pipeline.config.descriptor = "quilt.mod.json".to_owned();

    let index = MappingIndex::parse(MappingFile::new(MAPPING)).unwrap();
    let report = pipeline
        .rewrite(&index, DirectorySource::new(&source))
        .unwrap();
    assert_eq!(report.documents.len(), 3);

    assert_eq!(
        fs::read_to_string(pipeline.overlay.join("quilt.mod.json")).unwrap(),
        MOD_JSON_REWRITTEN
    );
    assert_eq!(
        fs::read_to_string(pipeline.overlay.join("tweaks.mixins.json")).unwrap(),
        MIXINS_JSON_REWRITTEN
    );
}

#[test]
fn test_invalid_entrypoint() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "out.jar");
    build_jar(
        &pipeline.input,
        &[(
            "fabric.mod.json",
            br#"{"entrypoints":{"main":[null]}}"#.as_slice(),
        )],
    );

    let err = pipeline.run().unwrap_err();
    match err {
        Error::Descriptor(DescriptorError::Validation { path, .. }) => {
            assert_eq!(path, "fabric.mod.json")
        }
        err => panic!("unexpected error {err:?}"),
    }
    assert!(!pipeline.output.exists());
}

#[test]
fn test_missing_mixin_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "out.jar");
    build_jar(
        &pipeline.input,
        &[("fabric.mod.json", br#"{"mixins":["missing.mixins.json"]}"#.as_slice())],
    );

    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err,
        Error::Descriptor(DescriptorError::Io { ref path, .. }) if path == "missing.mixins.json"
    ));
}

#[test]
fn test_mixin_path_outside_archive() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "out.jar");
    build_jar(
        &pipeline.input,
        &[(
            "fabric.mod.json",
            br#"{"mixins":["../escaped.mixins.json"]}"#.as_slice(),
        )],
    );

    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err,
        Error::Descriptor(DescriptorError::Validation { ref path, .. }) if path == "fabric.mod.json"
    ));
    assert!(!dir.path().join("escaped.mixins.json").exists());
    assert!(!pipeline.output.exists());
}

#[test]
fn test_descriptor_path_outside_archive() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline(dir.path(), "out.jar");
    tweaks_jar(&pipeline.input);

    for descriptor in ["../fabric.mod.json", "/fabric.mod.json"] {
        pipeline.config.descriptor = descriptor.to_owned();
        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err,
            Error::Descriptor(DescriptorError::Validation { ref path, .. }) if path == descriptor
        ));
    }
    assert!(!dir.path().join("fabric.mod.json").exists());
}

#[test]
fn test_invalid_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "out.jar");
    fs::write(&pipeline.mappings, "    int x -> a\n").unwrap();
    tweaks_jar(&pipeline.input);

    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, Error::Mapping { .. }));
}

#[test]
fn test_unknown_literals() {
    let index = MappingIndex::parse(MappingFile::new(MAPPING)).unwrap();
    let rewriter = DocumentRewriter::new(&index);

    let text = r#"{
  "id": "tweaks",
  "entrypoints": {
    "main": ["net.example.other.OtherMod", "net.example.tweaks.TweaksMod::missing"],
    "server": ["net.example.tweaks.TweaksMod::reload"]
  },
  "description": "net.example.tweaks.TweaksMod"
}"#;
    let rewritten = rewriter
        .rewrite_mod_descriptor("fabric.mod.json", text)
        .unwrap();

    // every occurrence of a known literal is rewritten, other literals are not
    assert_eq!(
        rewritten,
        r#"{
  "id": "tweaks",
  "entrypoints": {
    "main": ["net.example.other.OtherMod", "net.example.tweaks.TweaksMod::missing"],
    "server": ["a.a::a"]
  },
  "description": "net.example.tweaks.TweaksMod"
}"#
    );
}
