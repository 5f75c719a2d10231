//! Arabic / French strings emitted by the service.
//!
//! Only the strings that leave the server live here: error and success
//! messages, category and status labels, export headers and notification
//! sentences. Page copy belongs to the front end.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ar,
    Fr,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::Ar => "ar",
            Language::Fr => "fr",
        }
    }

    /// Text direction for the language
    pub fn dir(self) -> &'static str {
        match self {
            Language::Ar => "rtl",
            Language::Fr => "ltr",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ar" => Ok(Language::Ar),
            "fr" => Ok(Language::Fr),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationKey {
    FormTitle,
    SuccessMessage,
    ErrorMessage,
    ValidationErrorAllFields,
    UploadError,
    UploadAuthError,
    LoginError,
    CategoryParticipant,
    CategoryExhibitor,
    CategorySpeaker,
    CategoryTelevision,
    Pending,
    Confirmed,
    Rejected,
    RegistrationNumber,
    SubmissionDate,
    FullName,
    Email,
    NationalId,
    Phone,
    Category,
    Status,
    AttachmentsColumn,
    EmailSimulationConfirm,
    EmailSimulationReject,
}

/// Look up `key` in `language`.
pub fn t(key: TranslationKey, language: Language) -> &'static str {
    let (ar, fr) = entry(key);
    match language {
        Language::Ar => ar,
        Language::Fr => fr,
    }
}

fn entry(key: TranslationKey) -> (&'static str, &'static str) {
    use TranslationKey::*;

    match key {
        FormTitle => (
            "الجائزة الكبرى للصحافة في المجال الفلاحي و القروي",
            "Grand prix de la presse Agricole et Rurale",
        ),
        SuccessMessage => (
            "شكرًا لك. تم استلام تسجيلك وملفاتك بنجاح.",
            "Merci. Votre inscription et vos fichiers ont été reçus avec succès.",
        ),
        ErrorMessage => (
            "لم نتمكن من معالجة تسجيلك. يرجى المحاولة مرة أخرى لاحقًا.",
            "Nous n'avons pas pu traiter votre inscription. Veuillez réessayer plus tard.",
        ),
        ValidationErrorAllFields => (
            "يرجى ملء جميع الحقول الإجبارية.",
            "Veuillez remplir tous les champs obligatoires.",
        ),
        UploadError => (
            "فشل رفع الملفات إلى OneDrive. يرجى التأكد من صحة الإعدادات والمحاولة مرة أخرى.",
            "Échec du téléversement sur OneDrive. Veuillez vérifier la configuration et réessayer.",
        ),
        UploadAuthError => (
            "انتهت صلاحية الاتصال بخدمة التخزين. يرجى التواصل مع المسؤول.",
            "La connexion au service de stockage a expiré. Veuillez contacter l'administrateur.",
        ),
        LoginError => (
            "كلمة المرور غير صحيحة. يرجى المحاولة مرة أخرى.",
            "Mot de passe incorrect. Veuillez réessayer.",
        ),
        CategoryParticipant => ("الصحافة المكتوبة", "Presse écrite"),
        CategoryExhibitor => ("الصحافة الإلكترونية", "Presse électronique"),
        CategorySpeaker => ("الإعلام الإذاعي", "Radio"),
        CategoryTelevision => ("الإعلام التلفزي", "Télévision"),
        Pending => ("قيد الانتظار", "En attente"),
        Confirmed => ("مقبول", "Accepté"),
        Rejected => ("مرفوض", "Rejeté"),
        RegistrationNumber => ("#", "#"),
        SubmissionDate => ("تاريخ التسجيل", "Date de soumission"),
        FullName => ("الاسم الكامل", "Nom complet"),
        Email => ("البريد الإلكتروني", "E-mail"),
        NationalId => ("رقم البطاقة الوطنية", "N° CIN"),
        Phone => ("الهاتف", "Téléphone"),
        Category => ("الفئة", "Catégorie"),
        Status => ("الحالة", "Statut"),
        AttachmentsColumn => ("المرفقات", "Pièces jointes"),
        EmailSimulationConfirm => (
            "سيتم إرسال بريد إلكتروني بالقبول إلى",
            "Un e-mail d'acceptation serait envoyé à",
        ),
        EmailSimulationReject => (
            "سيتم إرسال بريد إلكتروني بالرفض إلى",
            "Un e-mail de rejet serait envoyé à",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_codes() {
        assert_eq!("fr".parse::<Language>(), Ok(Language::Fr));
        assert_eq!(" AR ".parse::<Language>(), Ok(Language::Ar));
        assert!("en".parse::<Language>().is_err());
        assert_eq!(Language::default(), Language::Ar);
    }

    #[test]
    fn looks_up_both_languages() {
        assert_eq!(t(TranslationKey::CategorySpeaker, Language::Fr), "Radio");
        assert_eq!(t(TranslationKey::CategorySpeaker, Language::Ar), "الإعلام الإذاعي");
        assert_eq!(Language::Ar.dir(), "rtl");
        assert_eq!(Language::Fr.dir(), "ltr");
    }
}
