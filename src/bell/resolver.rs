//! Resolver Module
//!
//! Collects title, client machine and icon for the window a bell came from.
//! Every lookup is best-effort: a failure is logged and leaves its field empty.

use std::path::PathBuf;
use tracing::{debug, warn};
use x11rb::protocol::xproto::Window;

use crate::bell::icons::{self, IconFiles, IconStrategy, MAX_ICON_PIXELS};
use crate::bell::pixels::IconImage;
use crate::bell::query::WindowQuery;

/// Where a bell event's icon came from
#[derive(Debug, Default)]
pub enum IconSource {
    #[default]
    None,
    /// `_NET_WM_ICON`
    Inline(IconImage),
    /// WM_HINTS icon window or pixmap/mask, decoded in-process
    PixmapPair(IconImage),
    /// WM_HINTS pixmap/mask written to temporary XPM files
    FilePair(IconFiles),
}

impl IconSource {
    /// Renderable image, if this source has one
    pub fn image(&self) -> Option<&IconImage> {
        match self {
            IconSource::Inline(image) | IconSource::PixmapPair(image) => Some(image),
            IconSource::None | IconSource::FilePair(_) => None,
        }
    }

    pub fn files(&self) -> Option<&IconFiles> {
        match self {
            IconSource::FilePair(files) => Some(files),
            _ => None,
        }
    }
}

/// Icon extraction settings
#[derive(Debug, Clone)]
pub struct IconOptions {
    pub strategy: IconStrategy,
    pub temp_dir: PathBuf,
    pub max_icon_pixels: u32,
}

impl Default for IconOptions {
    fn default() -> Self {
        Self {
            strategy: IconStrategy::Direct,
            temp_dir: std::env::temp_dir(),
            max_icon_pixels: MAX_ICON_PIXELS,
        }
    }
}

/// Metadata of the window a bell event came from
#[derive(Debug, Default)]
pub struct WindowAttributes {
    /// Window actually queried (the root window when the event had none)
    pub window: Window,
    pub title: String,
    pub host_name: String,
    pub icon: IconSource,
}

/// Resolve attributes for `window`, substituting the root window when absent
pub fn resolve<Q: WindowQuery>(
    query: &Q,
    window: Option<Window>,
    sequence: u64,
    options: &IconOptions,
) -> WindowAttributes {
    let window = match window.filter(|&w| w != x11rb::NONE) {
        Some(window) => window,
        None => {
            let root = query.root_window();
            debug!("Bell without window, using root {:#x}", root);
            root
        }
    };

    let title = match query.window_title(window) {
        Ok(Some(title)) => title,
        Ok(None) => {
            debug!("Window {:#x} has no name", window);
            String::new()
        }
        Err(e) => {
            warn!("Could not retrieve name for window {:#x}: {:#}", window, e);
            String::new()
        }
    };

    let host_name = match query.client_machine(window) {
        Ok(Some(host)) => host,
        Ok(None) => {
            debug!("Window {:#x} has no client machine", window);
            String::new()
        }
        Err(e) => {
            warn!("Could not get client name for window {:#x}: {:#}", window, e);
            String::new()
        }
    };

    let icon = resolve_icon(query, window, sequence, options);

    WindowAttributes {
        window,
        title,
        host_name,
        icon,
    }
}

/// Pick exactly one icon source: `_NET_WM_ICON` first, then WM_HINTS
fn resolve_icon<Q: WindowQuery>(
    query: &Q,
    window: Window,
    sequence: u64,
    options: &IconOptions,
) -> IconSource {
    match icons::read_inline_icon(query, window, options.max_icon_pixels) {
        Ok(Some(image)) => return IconSource::Inline(image),
        Ok(None) => {}
        Err(e) => warn!("Malformed _NET_WM_ICON on {:#x}: {:#}", window, e),
    }

    let hints = match query.wm_hints(window) {
        Ok(Some(hints)) => hints,
        Ok(None) => return IconSource::None,
        Err(e) => {
            warn!("Could not read WM_HINTS for window {:#x}: {:#}", window, e);
            return IconSource::None;
        }
    };

    // Icon windows are always decoded directly.
    if options.strategy == IconStrategy::File && hints.icon_window.is_none() {
        let written = icons::write_hints_icon(
            query,
            &hints,
            &options.temp_dir,
            sequence,
            options.max_icon_pixels,
        );
        return match written {
            Ok(Some(files)) => IconSource::FilePair(files),
            Ok(None) => IconSource::None,
            Err(e) => {
                warn!("Failed to write icon files for window {:#x}: {:#}", window, e);
                IconSource::None
            }
        };
    }

    match icons::read_hints_icon(query, &hints, options.max_icon_pixels) {
        Ok(Some(image)) => IconSource::PixmapPair(image),
        Ok(None) => IconSource::None,
        Err(e) => {
            warn!("Failed to build icon for window {:#x}: {:#}", window, e);
            IconSource::None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bell::hints::WmHints;
    use crate::bell::pixels::Bitmap;
    use anyhow::{Result, anyhow};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use x11rb::protocol::xproto::{Atom, Drawable};

    pub const ROOT: Window = 0x100;

    /// In-memory window tree standing in for the X server
    #[derive(Default)]
    pub struct FakeWindows {
        pub titles: HashMap<Window, String>,
        pub hosts: HashMap<Window, String>,
        pub icons: HashMap<Window, Vec<u32>>,
        pub hints: HashMap<Window, WmHints>,
        pub drawables: HashMap<Drawable, Bitmap>,
        pub atoms: HashMap<Atom, String>,
        pub failing: Vec<Window>,
        pub queried: RefCell<Vec<Window>>,
        pub icon_fetches: RefCell<Vec<(u32, u32)>>,
        pub image_reads: RefCell<Vec<Drawable>>,
    }

    impl FakeWindows {
        fn check(&self, window: Window) -> Result<()> {
            self.queried.borrow_mut().push(window);
            if self.failing.contains(&window) {
                return Err(anyhow!("BadWindow {:#x}", window));
            }
            Ok(())
        }
    }

    impl WindowQuery for FakeWindows {
        fn root_window(&self) -> Window {
            ROOT
        }

        fn atom_name(&self, atom: Atom) -> Result<Option<String>> {
            Ok(self.atoms.get(&atom).cloned())
        }

        fn window_title(&self, window: Window) -> Result<Option<String>> {
            self.check(window)?;
            Ok(self.titles.get(&window).cloned())
        }

        fn client_machine(&self, window: Window) -> Result<Option<String>> {
            self.check(window)?;
            Ok(self.hosts.get(&window).cloned())
        }

        fn icon_words(&self, window: Window, offset: u32, length: u32) -> Result<Vec<u32>> {
            self.check(window)?;
            self.icon_fetches.borrow_mut().push((offset, length));
            Ok(self
                .icons
                .get(&window)
                .map(|words| {
                    words
                        .iter()
                        .skip(offset as usize)
                        .take(length as usize)
                        .copied()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn wm_hints(&self, window: Window) -> Result<Option<WmHints>> {
            self.check(window)?;
            Ok(self.hints.get(&window).cloned())
        }

        fn drawable_size(&self, drawable: Drawable) -> Result<(u16, u16)> {
            let bits = self
                .drawables
                .get(&drawable)
                .ok_or_else(|| anyhow!("BadDrawable {:#x}", drawable))?;
            Ok((u16::try_from(bits.width())?, u16::try_from(bits.height())?))
        }

        fn drawable_image(&self, drawable: Drawable, width: u16, height: u16) -> Result<Bitmap> {
            self.image_reads.borrow_mut().push(drawable);
            let bits = self
                .drawables
                .get(&drawable)
                .ok_or_else(|| anyhow!("BadDrawable {:#x}", drawable))?;
            assert_eq!((bits.width(), bits.height()), (u32::from(width), u32::from(height)));
            Ok(bits.clone())
        }
    }

    fn options() -> IconOptions {
        IconOptions::default()
    }

    #[test]
    fn test_absent_window_uses_root() {
        let mut fake = FakeWindows::default();
        fake.titles.insert(ROOT, "root".into());

        let attributes = resolve(&fake, None, 1, &options());
        assert_eq!(attributes.window, ROOT);
        assert_eq!(attributes.title, "root");
        assert_eq!(attributes.host_name, "");
        assert!(matches!(attributes.icon, IconSource::None));
        assert!(fake.queried.borrow().iter().all(|&w| w == ROOT));

        let attributes = resolve(&fake, Some(0), 2, &options());
        assert_eq!(attributes.window, ROOT);
    }

    #[test]
    fn test_failures_leave_fields_empty() {
        let mut fake = FakeWindows::default();
        fake.failing.push(0x42);

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        assert_eq!(attributes.window, 0x42);
        assert_eq!(attributes.title, "");
        assert_eq!(attributes.host_name, "");
        assert!(matches!(attributes.icon, IconSource::None));
    }

    #[test]
    fn test_inline_icon_wins() {
        let mut fake = FakeWindows::default();
        fake.titles.insert(0x42, "xterm".into());
        fake.hosts.insert(0x42, "devbox".into());
        fake.icons.insert(0x42, vec![2, 1, 0xffff_0000, 0x0000_00ff]);
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                ..WmHints::default()
            },
        );

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        assert_eq!(attributes.title, "xterm");
        assert_eq!(attributes.host_name, "devbox");
        let IconSource::Inline(image) = &attributes.icon else {
            panic!("expected inline icon, got {:?}", attributes.icon);
        };
        assert_eq!((image.width(), image.height()), (2, 1));
        assert_eq!(image.to_argb(), vec![0xff, 0xff, 0, 0, 0, 0, 0, 0xff]);
    }

    #[test]
    fn test_inline_fetch_bounded_by_size() {
        let mut fake = FakeWindows::default();
        // A second icon follows the first; only the first 2x2 may be read.
        let mut words = vec![2, 2, 1, 2, 3, 4];
        words.extend([16, 16]);
        words.extend(std::iter::repeat_n(9, 256));
        fake.icons.insert(0x42, words);

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        assert!(matches!(attributes.icon, IconSource::Inline(_)));
        assert_eq!(*fake.icon_fetches.borrow(), vec![(0, 1), (1, 1), (2, 4)]);
    }

    #[test]
    fn test_truncated_inline_falls_back_to_hints() {
        let mut fake = FakeWindows::default();
        fake.icons.insert(0x42, vec![4, 4, 1, 2, 3]);
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                ..WmHints::default()
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(2, 2, vec![1, 0, 0, 1]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        let IconSource::PixmapPair(image) = &attributes.icon else {
            panic!("expected pixmap icon, got {:?}", attributes.icon);
        };
        assert!(image.to_argb().chunks(4).all(|p| p[0] == 0xff));
    }

    #[test]
    fn test_oversized_inline_rejected() {
        let mut fake = FakeWindows::default();
        fake.icons.insert(0x42, vec![0x10000, 0x10000]);
        let attributes = resolve(&fake, Some(0x42), 1, &options());
        assert!(matches!(attributes.icon, IconSource::None));
        // No pixel fetch was attempted.
        assert_eq!(fake.icon_fetches.borrow().len(), 2);
    }

    #[test]
    fn test_pixmap_mask_supplies_alpha() {
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                icon_mask: Some(0x51),
                ..WmHints::default()
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(2, 1, vec![1, 1]).unwrap());
        fake.drawables
            .insert(0x51, Bitmap::new(2, 1, vec![0, 1]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        let image = attributes.icon.image().unwrap();
        assert_eq!(image.to_argb(), vec![0x00, 0, 0, 0, 0xff, 0, 0, 0]);
    }

    #[test]
    fn test_mismatched_mask_dropped() {
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                icon_mask: Some(0x51),
                ..WmHints::default()
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(2, 1, vec![0, 0]).unwrap());
        fake.drawables
            .insert(0x51, Bitmap::new(1, 1, vec![0]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        let image = attributes.icon.image().unwrap();
        assert!(image.to_argb().chunks(4).all(|p| p[0] == 0xff));
    }

    #[test]
    fn test_icon_window_preferred_over_pixmap() {
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                icon_window: Some(0x60),
                icon_mask: None,
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(1, 1, vec![0]).unwrap());
        fake.drawables
            .insert(0x60, Bitmap::new(3, 3, vec![1; 9]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 1, &options());
        let image = attributes.icon.image().unwrap();
        assert_eq!((image.width(), image.height()), (3, 3));
    }

    fn capped(max_icon_pixels: u32) -> IconOptions {
        IconOptions {
            max_icon_pixels,
            ..IconOptions::default()
        }
    }

    #[test]
    fn test_oversized_pixmap_not_read_back() {
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                ..WmHints::default()
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(5, 5, vec![1; 25]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 1, &capped(16));
        assert!(matches!(attributes.icon, IconSource::None));
        assert!(fake.image_reads.borrow().is_empty());

        // At the limit the pixmap is accepted.
        let attributes = resolve(&fake, Some(0x42), 2, &capped(25));
        assert!(matches!(attributes.icon, IconSource::PixmapPair(_)));
    }

    #[test]
    fn test_oversized_icon_window_falls_back_to_pixmap() {
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                icon_window: Some(ROOT),
                icon_mask: None,
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(2, 2, vec![1, 0, 0, 1]).unwrap());
        fake.drawables
            .insert(ROOT, Bitmap::new(8, 8, vec![0; 64]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 1, &capped(16));
        let image = attributes.icon.image().unwrap();
        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(*fake.image_reads.borrow(), vec![0x50]);
    }

    #[test]
    fn test_oversized_pixmap_not_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = IconOptions {
            strategy: IconStrategy::File,
            temp_dir: dir.path().to_path_buf(),
            max_icon_pixels: 16,
        };
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                ..WmHints::default()
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(5, 5, vec![1; 25]).unwrap());

        let attributes = resolve(&fake, Some(0x42), 3, &options);
        assert!(matches!(attributes.icon, IconSource::None));
        assert!(!dir.path().join("xbell_icon_3.xpm").exists());
    }

    #[test]
    fn test_file_strategy_writes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let options = IconOptions {
            strategy: IconStrategy::File,
            temp_dir: dir.path().to_path_buf(),
            max_icon_pixels: MAX_ICON_PIXELS,
        };
        let mut fake = FakeWindows::default();
        fake.hints.insert(
            0x42,
            WmHints {
                icon_pixmap: Some(0x50),
                icon_mask: Some(0x51),
                ..WmHints::default()
            },
        );
        fake.drawables
            .insert(0x50, Bitmap::new(2, 2, vec![1, 0, 0, 1]).unwrap());
        fake.drawables
            .insert(0x51, Bitmap::new(2, 2, vec![1, 1, 1, 0]).unwrap());

        let first = resolve(&fake, Some(0x42), 7, &options);
        let second = resolve(&fake, Some(0x42), 8, &options);

        let first_files = first.icon.files().unwrap();
        let second_files = second.icon.files().unwrap();
        let first_paths = (
            first_files.pixmap_path().to_path_buf(),
            first_files.mask_path().unwrap().to_path_buf(),
        );
        let second_paths = (
            second_files.pixmap_path().to_path_buf(),
            second_files.mask_path().unwrap().to_path_buf(),
        );

        assert!(first.icon.image().is_none());
        assert_eq!(first_paths.0, dir.path().join("xbell_icon_7.xpm"));
        assert_eq!(first_paths.1, dir.path().join("xbell_mask_7.xpm"));
        assert_ne!(first_paths.0, second_paths.0);
        assert_ne!(first_paths.1, second_paths.1);
        for path in [&first_paths.0, &first_paths.1, &second_paths.0, &second_paths.1] {
            assert!(path.exists());
        }

        drop(first);
        assert!(!first_paths.0.exists());
        assert!(!first_paths.1.exists());
        assert!(second_paths.0.exists());

        drop(second);
        assert!(!second_paths.0.exists());
        assert!(!second_paths.1.exists());
    }
}
