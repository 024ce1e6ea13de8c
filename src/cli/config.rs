use crate::config::generate::generate_starter_config;
use crate::config::{user_config_path, SYSTEM_CONFIG_PATH};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try ~/.config/h2trace/config.yml first
    let config_path = match user_config_path() {
        Some(user_config) => match user_config.parent().map(fs::create_dir_all) {
            Some(Err(_)) => {
                eprintln!("Warning: Could not create directory for {}", user_config.display());
                eprintln!("Falling back to {}", SYSTEM_CONFIG_PATH);
                PathBuf::from(SYSTEM_CONFIG_PATH)
            }
            _ => user_config,
        },
        None => PathBuf::from(SYSTEM_CONFIG_PATH),
    };

    write_new_config(&config_path, &config_content)?;
    println!("Config file written to {}", config_path.display());
    Ok(())
}

/// Write `content` to `path`, creating parent directories. Refuses to replace an existing file.
pub fn write_new_config(path: &Path, content: &str) -> io::Result<()> {
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "config file already exists at {}; remove it first or use --stdout",
                path.display()
            ),
        ));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_new_config_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/h2trace/config.yml");
        write_new_config(&path, "input:\n  module: http2\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "input:\n  module: http2\n");
    }

    #[test]
    fn test_write_new_config_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "keep me").unwrap();

        let err = write_new_config(&path, "new").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }
}
