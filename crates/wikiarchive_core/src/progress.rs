use crate::error::Locale;

/// Points in a publish run at which progress is reported. Each stage owns
/// a fixed percentage so callers see a monotonic sequence ending at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Initializing,
    Parsed,
    Connecting,
    CreatingStructure,
    FundPage,
    DescriptionPage,
    CasePage,
    ArchiveTable,
    FundTable,
    DescriptionTable,
    UploadStarted,
    /// Upload progress of the file itself, 0-100.
    Uploading(u8),
    Done,
}

impl PublishStage {
    pub fn percent(self) -> u8 {
        match self {
            Self::Initializing => 5,
            Self::Parsed => 10,
            Self::Connecting => 15,
            Self::CreatingStructure => 20,
            Self::FundPage => 25,
            Self::DescriptionPage => 30,
            Self::CasePage => 35,
            Self::ArchiveTable => 40,
            Self::FundTable => 45,
            Self::DescriptionTable => 50,
            Self::UploadStarted => 55,
            Self::Uploading(file_percent) => {
                let file_percent = u32::from(file_percent.min(100));
                (55 + file_percent * 45 / 100) as u8
            }
            Self::Done => 100,
        }
    }

    pub fn message(self, locale: Locale) -> String {
        let text = match (self, locale) {
            (Self::Initializing, Locale::Uk) => "Ініціалізація з'єднання...",
            (Self::Initializing, Locale::En) => "Initializing connection...",
            (Self::Parsed, Locale::Uk) => "Файл успішно проаналізовано...",
            (Self::Parsed, Locale::En) => "File name parsed...",
            (Self::Connecting, Locale::Uk) => "Підключення...",
            (Self::Connecting, Locale::En) => "Connecting...",
            (Self::CreatingStructure, Locale::Uk) => "Створення структури сторінок...",
            (Self::CreatingStructure, Locale::En) => "Creating page structure...",
            (Self::FundPage, Locale::Uk) => "Створення сторінки фонду...",
            (Self::FundPage, Locale::En) => "Creating fund page...",
            (Self::DescriptionPage, Locale::Uk) => "Створення сторінки опису...",
            (Self::DescriptionPage, Locale::En) => "Creating description page...",
            (Self::CasePage, Locale::Uk) => "Створення сторінки справи...",
            (Self::CasePage, Locale::En) => "Creating case page...",
            (Self::ArchiveTable, Locale::Uk) => "Оновлення навігаційних сторінок...",
            (Self::ArchiveTable, Locale::En) => "Updating archive list...",
            (Self::FundTable, Locale::Uk) => "Оновлення сторінки фонду...",
            (Self::FundTable, Locale::En) => "Updating fund page...",
            (Self::DescriptionTable, Locale::Uk) => "Оновлення сторінки опису...",
            (Self::DescriptionTable, Locale::En) => "Updating description page...",
            (Self::UploadStarted, Locale::Uk) => "Початок завантаження файлу...",
            (Self::UploadStarted, Locale::En) => "Starting file upload...",
            (Self::Uploading(file_percent), Locale::Uk) => {
                return format!("Завантаження: {file_percent}%");
            }
            (Self::Uploading(file_percent), Locale::En) => {
                return format!("Uploading: {file_percent}%");
            }
            (Self::Done, Locale::Uk) => "Публікацію завершено успішно!",
            (Self::Done, Locale::En) => "Publishing finished successfully!",
        };
        text.to_string()
    }
}

pub trait ProgressReporter {
    fn report(&mut self, stage: PublishStage);
}

impl<F> ProgressReporter for F
where
    F: FnMut(PublishStage),
{
    fn report(&mut self, stage: PublishStage) {
        self(stage)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&mut self, _stage: PublishStage) {}
}

/// Adapts a `(percent, message)` callback to stage reports.
pub struct LocalizedProgress<F> {
    locale: Locale,
    callback: F,
}

impl<F> LocalizedProgress<F>
where
    F: FnMut(u8, &str),
{
    pub fn new(locale: Locale, callback: F) -> Self {
        Self { locale, callback }
    }
}

impl<F> ProgressReporter for LocalizedProgress<F>
where
    F: FnMut(u8, &str),
{
    fn report(&mut self, stage: PublishStage) {
        let message = stage.message(self.locale);
        (self.callback)(stage.percent(), &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_progress_maps_into_upper_range() {
        assert_eq!(PublishStage::Uploading(0).percent(), 55);
        assert_eq!(PublishStage::Uploading(50).percent(), 77);
        assert_eq!(PublishStage::Uploading(100).percent(), 100);
        assert_eq!(PublishStage::Uploading(250).percent(), 100);
    }

    #[test]
    fn stages_are_monotonic() {
        let stages = [
            PublishStage::Initializing,
            PublishStage::Parsed,
            PublishStage::Connecting,
            PublishStage::CreatingStructure,
            PublishStage::FundPage,
            PublishStage::DescriptionPage,
            PublishStage::CasePage,
            PublishStage::ArchiveTable,
            PublishStage::FundTable,
            PublishStage::DescriptionTable,
            PublishStage::UploadStarted,
            PublishStage::Uploading(0),
            PublishStage::Uploading(60),
            PublishStage::Done,
        ];
        let percents = stages.iter().map(|stage| stage.percent()).collect::<Vec<_>>();
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[test]
    fn localized_progress_formats_messages() {
        let mut seen = Vec::new();
        {
            let mut reporter = LocalizedProgress::new(Locale::Uk, |percent: u8, message: &str| {
                seen.push((percent, message.to_string()));
            });
            reporter.report(PublishStage::Parsed);
            reporter.report(PublishStage::Uploading(40));
        }
        assert_eq!(
            seen,
            vec![
                (10, "Файл успішно проаналізовано...".to_string()),
                (73, "Завантаження: 40%".to_string()),
            ]
        );
    }
}
