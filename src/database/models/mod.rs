pub mod disbursement;
pub mod geo;
pub mod group;
pub mod image;
pub mod loan;
pub mod payment;
pub mod permission;
pub mod profile;
pub mod role;
pub mod user;

pub use disbursement::{Disbursement, DisbursementResult, DisbursementStatus, NewDisbursement};
pub use geo::{GeoLevel, GeoNode, LEVELS};
pub use group::{Group, GroupMember};
pub use image::{ImageList, ImageRef};
pub use loan::{Loan, LoanStatus, NewLoan};
pub use payment::{NewPayment, Payment};
pub use permission::{Permission, PermissionUsage};
pub use profile::{Member, MemberGroup, Placement, Profile, ProfileKind};
pub use role::{Role, RoleUsage};
pub use user::{MonthlyCount, NewUser, User};
