/// Class id to label mapping. Order must match the model's training labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

impl ClassCatalog {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::new(["Powdery Mildew", "Septoria_leaf_spot"])
    }
}
