//! Envfile encoder

use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::envfile::Envfile;
use crate::error::Result;

/// Encodes an envfile back into its on-disk text form
pub struct Encoder {
    // Currently stateless, but reserved for future options
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {}
    }

    /// Encode an envfile to a string
    ///
    /// Plain sections are written verbatim; named sections are written with
    /// canonical single-`#` markers around their body.
    pub fn encode(&self, envfile: &Envfile) -> String {
        let mut output = String::new();
        for (_, section) in envfile.sections() {
            section.render(&mut output);
        }
        output
    }

    /// Encode an envfile directly to a writer
    pub fn encode_to_writer<W: Write>(&self, envfile: &Envfile, mut writer: W) -> Result<()> {
        let encoded = self.encode(envfile);
        writer.write_all(encoded.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Encode an envfile to a file, replacing its content
    pub fn encode_to_file(&self, envfile: &Envfile, path: &Path) -> Result<()> {
        let encoded = self.encode(envfile);
        std::fs::write(path, &encoded)?;
        debug!(path = %path.display(), bytes = encoded.len(), "wrote envfile");
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
