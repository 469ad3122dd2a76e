use std::io::Cursor;

use relay_channels::AttachmentRef;
use relay_pipeline::{content_hash, AttachmentPipeline, ContentStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn attachment(server: &MockServer, route: &str, filename: &str, size: Option<u64>) -> AttachmentRef {
    AttachmentRef {
        url: format!("{}{route}", server.uri()),
        filename: filename.into(),
        size,
        content_type: None,
    }
}

fn pipeline(store: &tempfile::TempDir, max_bytes: u64) -> AttachmentPipeline {
    AttachmentPipeline::new(
        reqwest::Client::new(),
        ContentStore::new(store.path()),
        max_bytes,
        true,
    )
}

#[tokio::test]
async fn identical_content_is_stored_once() {
    let server = MockServer::start().await;
    for route in ["/one", "/two"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same bytes".to_vec()))
            .mount(&server)
            .await;
    }
    let store = tempfile::tempdir().unwrap();
    let out = pipeline(&store, 1024)
        .process(&[
            attachment(&server, "/one", "a.txt", Some(10)),
            attachment(&server, "/two", "b.log", Some(10)),
        ])
        .await;

    assert_eq!(out.len(), 2);
    let hash = content_hash(b"same bytes");
    for d in &out {
        assert_eq!(d.error, None);
        assert_eq!(d.content_hash.as_deref(), Some(hash.as_str()));
        assert!(!d.is_image);
    }
    assert_eq!(out[0].stored_path, out[1].stored_path);

    let shard = store.path().join(&hash[..2]);
    assert_eq!(std::fs::read_dir(&shard).unwrap().count(), 1);
    assert_eq!(std::fs::read(shard.join(&hash)).unwrap(), b"same bytes");
}

#[tokio::test]
async fn declared_oversize_is_not_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 8]))
        .expect(0)
        .mount(&server)
        .await;
    let store = tempfile::tempdir().unwrap();
    let out = pipeline(&store, 100)
        .process(&[attachment(&server, "/big", "big.bin", Some(101))])
        .await;

    assert_eq!(out.len(), 1);
    let err = out[0].error.as_deref().unwrap();
    assert!(err.contains("101 bytes"), "{err}");
    assert!(out[0].content_hash.is_none());
}

#[tokio::test]
async fn oversize_body_and_failed_download_are_per_attachment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sneaky"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 500]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fine"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;

    let store = tempfile::tempdir().unwrap();
    let out = pipeline(&store, 100)
        .process(&[
            attachment(&server, "/sneaky", "s.bin", None),
            attachment(&server, "/gone", "g.png", Some(5)),
            attachment(&server, "/fine", "f.txt", Some(2)),
        ])
        .await;

    assert_eq!(out.len(), 3);
    assert!(out[0].error.is_some());
    assert!(out[1].error.is_some());
    assert!(out[1].note().unwrap().starts_with("[Attachment 'g.png' unavailable"));
    assert_eq!(out[2].error, None);
    assert_eq!(out[2].size, 2);
}

#[tokio::test]
async fn images_carry_base64_and_dimensions() {
    let server = MockServer::start().await;
    let png = png_bytes(4, 3);
    Mock::given(method("GET"))
        .and(path("/pic"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fake"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a png".to_vec()))
        .mount(&server)
        .await;

    let store = tempfile::tempdir().unwrap();
    let out = pipeline(&store, 1 << 20)
        .process(&[
            attachment(&server, "/pic", "pic.png", None),
            attachment(&server, "/fake", "fake.png", None),
        ])
        .await;

    let pic = &out[0];
    assert!(pic.is_image);
    let info = pic.image_info.as_ref().unwrap();
    assert_eq!((info.width, info.height), (Some(4), Some(3)));
    assert_eq!(info.format, "png");
    let source = pic.image_source().unwrap();
    assert_eq!(source.media_type, "image/png");
    assert!(!source.data.is_empty());

    let fake = &out[1];
    assert!(fake.is_image);
    assert_eq!(fake.error, None);
    assert_eq!(fake.image_info.as_ref().unwrap().format, "unknown");
}

#[tokio::test]
async fn bitmap_becomes_a_file_note() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"BM fake bitmap".to_vec()))
        .mount(&server)
        .await;
    let store = tempfile::tempdir().unwrap();
    let out = pipeline(&store, 1024)
        .process(&[attachment(&server, "/scan", "scan.bmp", None)])
        .await;

    let bmp = &out[0];
    assert!(!bmp.is_image);
    assert!(bmp.base64_payload.is_none());
    assert!(bmp.image_source().is_none());
    assert_eq!(
        bmp.note().as_deref(),
        Some("[Attachment: 'scan.bmp' (unknown, 14 bytes)]")
    );
}

#[tokio::test]
async fn disabled_pipeline_skips_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let store = tempfile::tempdir().unwrap();
    let disabled = AttachmentPipeline::new(
        reqwest::Client::new(),
        ContentStore::new(store.path()),
        1024,
        false,
    );
    assert!(disabled
        .process(&[attachment(&server, "/x", "x.png", None)])
        .await
        .is_empty());
    let reply = format!("look {}/x.png", server.uri());
    assert!(disabled.fetch_reply_images(&reply).await.is_empty());
}

#[tokio::test]
async fn reply_images_are_fetched_as_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/render/chart.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(2, 2)))
        .mount(&server)
        .await;
    let store = tempfile::tempdir().unwrap();
    let reply = format!("Here you go: ![chart]({}/render/chart.png)", server.uri());
    let files = pipeline(&store, 1 << 20).fetch_reply_images(&reply).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "chart.png");
}
