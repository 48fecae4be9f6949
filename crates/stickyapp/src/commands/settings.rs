use crate::model::{AppSettings, Document, SettingsPatch};

/// Field-wise merge. Only the shape of the values is checked (by their types).
pub fn update(doc: &mut Document, patch: &SettingsPatch) -> AppSettings {
    patch.apply_to(&mut doc.settings);
    doc.settings.clone()
}

pub fn replace(doc: &mut Document, settings: AppSettings) -> AppSettings {
    doc.settings = settings;
    doc.settings.clone()
}
