use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::reply::ProjectFiles;

pub fn zip_project(files: &ProjectFiles) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, body) in [
            ("index.html", &files.html),
            ("style.css", &files.css),
            ("script.js", &files.js),
        ] {
            writer
                .start_file(name, options)
                .with_context(|| format!("starting archive entry {name}"))?;
            writer
                .write_all(body.as_bytes())
                .with_context(|| format!("writing {name}"))?;
        }
        writer.finish().context("finalizing archive")?;
    }
    Ok(cursor.into_inner())
}

pub fn zip_project_base64(files: &ProjectFiles) -> Result<String> {
    Ok(STANDARD.encode(zip_project(files)?))
}
