use super::{FieldMap, FormErrors, field_value};

/// Create/edit form for a package's own fields.
#[derive(Clone, Debug, Default)]
pub struct PackageForm {
    pub provider_id: Option<String>,
    pub title: Option<String>,
}

impl PackageForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            provider_id: field_value(fields, "provider_id"),
            title: field_value(fields, "title"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.provider_id.is_none() {
            errors.add("provider_id", "Please select a provider.");
        }
        if self.title.is_none() {
            errors.add("title", "Please enter a title.");
        }
        errors
    }
}

/// Metadata accompanying a single-file resource upload. The file part itself
/// is read from the multipart stream by the handler and validated here.
#[derive(Clone, Debug, Default)]
pub struct FileUploadForm {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Digest claimed by the client, cross-checked against the received bytes.
    pub sha256: Option<String>,
}

impl FileUploadForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            title: field_value(fields, "title"),
            description: field_value(fields, "description"),
            sha256: field_value(fields, "sha256"),
        }
    }

    pub fn validate(&self, filename: Option<&str>) -> FormErrors {
        let mut errors = FormErrors::default();
        if !has_usable_filename(filename) {
            errors.add("file", "Please select a file.");
        }
        errors
    }
}

/// Metadata accompanying a zip upload destined for server-side unpacking.
#[derive(Clone, Debug, Default)]
pub struct ZipUploadForm {
    pub sha256: Option<String>,
}

impl ZipUploadForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            sha256: field_value(fields, "sha256"),
        }
    }

    pub fn validate(&self, filename: Option<&str>) -> FormErrors {
        let mut errors = FormErrors::default();
        if !has_usable_filename(filename) {
            errors.add("file", "Please select a file.");
        } else if let Some(filename) = filename {
            if !filename.to_ascii_lowercase().ends_with(".zip") {
                errors.add("file", "Expecting a .zip file.");
            }
        }
        errors
    }
}

/// A filename is usable if anything survives sanitization.
fn has_usable_filename(filename: Option<&str>) -> bool {
    filename.is_some_and(|name| !sanitize_filename::sanitize(name).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::parse_urlencoded;

    #[test]
    fn package_form_requires_provider_and_title() {
        let form = PackageForm::from_fields(&parse_urlencoded("title="));
        let errors = form.validate();
        assert!(errors.get("provider_id").is_some());
        assert!(errors.get("title").is_some());

        let form = PackageForm::from_fields(&parse_urlencoded("provider_id=p1&title=Moorings"));
        assert!(form.validate().is_empty());
    }

    #[test]
    fn file_upload_requires_a_selected_file() {
        let form = FileUploadForm::default();
        assert_eq!(form.validate(None).get("file"), Some("Please select a file."));
        assert!(form.validate(Some("..")).get("file").is_some());
        assert!(form.validate(Some("data.csv")).is_empty());
    }

    #[test]
    fn zip_upload_requires_zip_extension() {
        let form = ZipUploadForm::default();
        assert!(form.validate(Some("bundle.tar.gz")).get("file").is_some());
        assert!(form.validate(Some("bundle.ZIP")).is_empty());
    }
}
