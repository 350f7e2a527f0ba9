pub mod cache;
pub mod gateway;
pub mod media;
pub mod notifier;

pub use cache::{MemoryCache, PermissionCache, RedisCache};
pub use gateway::{MpesaGateway, PaymentGateway, StubGateway};
pub use media::{CloudinaryStore, MediaStore, MemoryMediaStore};
pub use notifier::{HttpMailNotifier, LogNotifier, Notifier};
