use std::fmt;

use crate::gitproxy::pktline::PktLineWriter;

/// The two smart HTTP pack services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Service::UploadPack),
            "git-receive-pack" => Some(Service::ReceivePack),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }

    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-advertisement",
            Service::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    pub fn request_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-request",
            Service::ReceivePack => "application/x-git-receive-pack-request",
        }
    }

    pub fn result_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-result",
            Service::ReceivePack => "application/x-git-receive-pack-result",
        }
    }

    /// `# service=<name>` pkt-line followed by a flush, sent before the ref advertisement.
    pub fn announcement(&self) -> Vec<u8> {
        let mut writer = PktLineWriter::new();
        writer.write_str(&format!("# service={}", self.name()));
        writer.flush();
        writer.into_bytes()
    }

    /// Only pushes are authenticated.
    pub fn requires_auth(&self) -> bool {
        matches!(self, Service::ReceivePack)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement() {
        assert_eq!(Service::UploadPack.announcement(), b"001e# service=git-upload-pack\n0000".to_vec());
        assert_eq!(Service::ReceivePack.announcement(), b"001f# service=git-receive-pack\n0000".to_vec());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Service::from_name("git-upload-pack"), Some(Service::UploadPack));
        assert_eq!(Service::from_name("git-receive-pack"), Some(Service::ReceivePack));
        assert_eq!(Service::from_name("git-upload-archive"), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            Service::ReceivePack.request_content_type(),
            "application/x-git-receive-pack-request"
        );
        assert_eq!(Service::UploadPack.result_content_type(), "application/x-git-upload-pack-result");
    }
}
