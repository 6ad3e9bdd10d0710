/// Text gathered from the current uploads, sent along with every question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContext {
    file: Option<FileText>,
    image_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct FileText {
    name: String,
    text: String,
}

impl ExtractedContext {
    pub fn set_file(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.file = Some(FileText {
            name: name.into(),
            text: text.into(),
        });
    }

    pub fn clear_file(&mut self) {
        self.file = None;
    }

    pub fn set_image_description(&mut self, description: impl Into<String>) {
        self.image_description = Some(description.into());
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.name.as_str())
    }

    pub fn has_image(&self) -> bool {
        self.image_description.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.image_description.is_none()
    }

    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        if let Some(file) = &self.file {
            sections.push(format!("UPLOADED FILE ({}):\n{}", file.name, file.text));
        }
        if let Some(description) = &self.image_description {
            sections.push(format!("IMAGE ANALYSIS:\n{}", description));
        }
        sections.join("\n\n")
    }
}
