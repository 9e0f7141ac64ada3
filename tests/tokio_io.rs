use multipart_spill::{Constraints, Multipart};
use std::io::Cursor;

#[tokio::test(flavor = "multi_thread")]
async fn test_multipart_async_reader() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";
    let reader = Cursor::new(data.as_bytes().to_vec());

    let mut m = Multipart::with_async_reader(
        reader,
        "multipart/form-data; boundary=X-BOUNDARY",
        Some(data.len() as u64),
        Constraints::default(),
    )
    .unwrap();

    let fields = tokio::task::spawn_blocking(move || {
        let mut fields = Vec::new();
        while let Some(field) = m.next_field().unwrap() {
            let name = field.name().map(str::to_owned);
            fields.push((name, field.text().unwrap()));
        }
        fields
    })
    .await
    .unwrap();

    assert_eq!(
        fields,
        vec![
            (Some("My Field".to_owned()), "abcd".to_owned()),
            (
                Some("File Field".to_owned()),
                "Hello world\nHello\r\nWorld\rAgain".to_owned()
            ),
        ]
    );
}
