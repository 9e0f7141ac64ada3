use multipart_spill::{Constraints, Multipart};
use tokio::io::AsyncRead;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Generate an `AsyncRead` and the content type from somewhere e.g. server request body.
    let (reader, content_type) = get_async_reader_from_somewhere().await;

    // Create a `Multipart` instance from that async reader and the content type.
    let mut multipart = Multipart::with_async_reader(reader, content_type, None, Constraints::default())?;

    // Decoding blocks, so drive it from a blocking task.
    tokio::task::spawn_blocking(move || -> multipart_spill::Result<()> {
        while let Some(field) = multipart.next_field()? {
            let name = field.name().map(str::to_owned);
            let file_name = field.file_name().map(str::to_owned);

            println!("Name: {:?}, File Name: {:?}", name, file_name);

            // Read field content as text.
            let content = field.text()?;
            println!("Content: {:?}", content);
        }
        Ok(())
    })
    .await??;

    Ok(())
}

// Generate an `AsyncRead` and the content type from somewhere e.g. server request body.
async fn get_async_reader_from_somewhere() -> (impl AsyncRead + Unpin + Send + 'static, &'static str) {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    (data.as_bytes(), "multipart/form-data; boundary=X-BOUNDARY")
}
